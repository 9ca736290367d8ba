use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Map, Value};

use endpoint_gateway::descriptor::fixture::ServiceFixture;

#[derive(Parser)]
#[command(name = "gatewayctl")]
#[command(about = "Management CLI for the endpoint gateway", long_about = None)]
struct Cli {
    #[arg(short, long, env = "GATEWAY_ADMIN_URL", default_value = "http://127.0.0.1:8081")]
    url: String,

    #[arg(short, long, env = "GATEWAY_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check control plane status
    Status,
    /// List endpoints, optionally filtered by tags (any match)
    List {
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// Show one endpoint
    Get { id: String },
    /// Create an endpoint from a JSON file
    Add { file: PathBuf },
    /// Patch the masked fields of an endpoint
    Patch {
        id: String,
        /// JSON object with the new field values
        #[arg(short, long)]
        fields: String,
        /// Fields to apply, comma-separated
        #[arg(short, long, value_delimiter = ',')]
        mask: Vec<String>,
    },
    /// Replace the tag set of an endpoint
    Tags {
        id: String,
        #[arg(value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// Delete an endpoint
    Delete { id: String },
    /// Dump the route table
    Routes,
    /// List registered backends and their in-flight counts
    Backends,
    /// Re-apply every stored endpoint
    Resync,
    /// Register a demo echo service pointing at the given backends
    Demo {
        #[arg(long, default_value = "echo.v1")]
        package: String,
        #[arg(long, default_value = "Echo")]
        service: String,
        #[arg(long, default_value = "/api/v1/echo")]
        path: String,
        #[arg(long, default_value = "rr")]
        balance: String,
        #[arg(required = true, value_delimiter = ',')]
        backends: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );
    let client = reqwest::Client::builder().default_headers(headers).build()?;
    let base = cli.url.trim_end_matches('/');

    let request = match cli.command {
        Commands::Status => client.get(format!("{base}/status")),
        Commands::List { tags } => {
            let mut request = client.get(format!("{base}/endpoints"));
            if !tags.is_empty() {
                request = request.query(&[("tags", tags.join(","))]);
            }
            request
        }
        Commands::Get { id } => client.get(format!("{base}/endpoints/{id}")),
        Commands::Add { file } => {
            let body: Value = serde_json::from_str(&std::fs::read_to_string(file)?)?;
            client.post(format!("{base}/endpoints")).json(&body)
        }
        Commands::Patch { id, fields, mask } => {
            let fields: Map<String, Value> = serde_json::from_str(&fields)?;
            client
                .patch(format!("{base}/endpoints/{id}"))
                .json(&json!({ "fields": fields, "mask": mask }))
        }
        Commands::Tags { id, tags } => client
            .put(format!("{base}/endpoints/{id}/tags"))
            .json(&json!({ "tags": tags })),
        Commands::Delete { id } => client.delete(format!("{base}/endpoints/{id}")),
        Commands::Routes => client.get(format!("{base}/routes")),
        Commands::Backends => client.get(format!("{base}/backends")),
        Commands::Resync => client.post(format!("{base}/resync")),
        Commands::Demo {
            package,
            service,
            path,
            balance,
            backends,
        } => {
            let fixture = ServiceFixture::new(&package, &service)
                .route(&service, "get", &path)
                .json_response(true);
            let body = json!({
                "name": service.to_ascii_lowercase(),
                "service_name": fixture.full_name(),
                "description": "demo service",
                "tags": ["demo"],
                "balance": balance,
                "endpoints": backends
                    .iter()
                    .map(|addr| json!({ "addr": addr, "weight": 1 }))
                    .collect::<Vec<_>>(),
                "descriptor_set": STANDARD.encode(fixture.encode()),
            });
            client.post(format!("{base}/endpoints")).json(&body)
        }
    };

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: admin API returned status {status}");
        if let Ok(text) = res.text().await {
            eprintln!("Response: {text}");
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
