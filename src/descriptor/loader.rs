//! Descriptor set loading.
//!
//! # Responsibilities
//! - Stage raw bytes in a scratch directory and read them back
//! - Resolve the file set against the well-known types
//! - Extract services, methods, HTTP rules and service flags

use std::fs;
use std::path::{Path, PathBuf};

use prost::Message;
use prost_reflect::{DescriptorPool, DynamicMessage, ExtensionDescriptor, ServiceDescriptor, Value};

use crate::descriptor::{
    HttpRule, HttpVerb, MethodDescription, ServiceDescription, ServiceInfo,
    AUTH_REQUIRED_EXTENSION, HTTP_RULE_EXTENSION, JSON_RESPONSE_EXTENSION,
};
use crate::error::{Error, Result};

const OP: &str = "descriptor.load";
const STAGED_FILE: &str = "descriptor_set.pb";

/// `FileDescriptorSet` with each file left encoded.
#[derive(Clone, PartialEq, Message)]
struct RawFileSet {
    #[prost(bytes = "vec", repeated, tag = "1")]
    file: Vec<Vec<u8>>,
}

/// Just the `name` of a `FileDescriptorProto`.
#[derive(Clone, PartialEq, Message)]
struct RawFileName {
    #[prost(string, optional, tag = "1")]
    name: Option<String>,
}

/// Loads descriptor sets using a fixed scratch location.
#[derive(Debug, Clone, Default)]
pub struct DescriptorLoader {
    cache_dir: Option<PathBuf>,
}

impl DescriptorLoader {
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        Self { cache_dir }
    }

    pub fn load(&self, raw: &[u8]) -> Result<ServiceDescription> {
        load(raw, self.cache_dir.as_deref())
    }
}

/// Parse a serialized `FileDescriptorSet` into a [`ServiceDescription`].
///
/// The bytes are written to a fresh directory under `cache_dir` (or the OS
/// temp dir) which is removed before returning, on success or failure.
pub fn load(raw: &[u8], cache_dir: Option<&Path>) -> Result<ServiceDescription> {
    if raw.is_empty() {
        return Err(Error::schema(OP, "descriptor set is empty"));
    }

    let scratch = match cache_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .map_err(|e| Error::schema(OP, format!("create {}: {e}", dir.display())))?;
            tempfile::Builder::new().prefix("descriptor-").tempdir_in(dir)
        }
        None => tempfile::Builder::new().prefix("descriptor-").tempdir(),
    }
    .map_err(|e| Error::schema(OP, format!("create scratch dir: {e}")))?;

    let staged = scratch.path().join(STAGED_FILE);
    fs::write(&staged, raw).map_err(|e| Error::schema(OP, format!("stage descriptor: {e}")))?;
    let bytes = fs::read(&staged).map_err(|e| Error::schema(OP, format!("read descriptor: {e}")))?;

    let description = describe(&bytes);
    if let Err(e) = scratch.close() {
        tracing::warn!(error = %e, "Failed to remove descriptor scratch dir");
    }
    description
}

fn describe(bytes: &[u8]) -> Result<ServiceDescription> {
    let mut pool = DescriptorPool::global();
    let files = pending_files(&pool, bytes)?;

    let names: Vec<String> = files.iter().map(|(name, _)| name.clone()).collect();
    let set = RawFileSet {
        file: files.into_iter().map(|(_, file)| file).collect(),
    };
    pool.decode_file_descriptor_set(set.encode_to_vec().as_slice())
        .map_err(|e| Error::schema(OP, format!("resolve descriptor set: {e}")))?;

    let http = pool.get_extension_by_name(HTTP_RULE_EXTENSION);
    let auth = pool.get_extension_by_name(AUTH_REQUIRED_EXTENSION);
    let json = pool.get_extension_by_name(JSON_RESPONSE_EXTENSION);

    let mut services = Vec::new();
    for name in &names {
        let Some(file) = pool.get_file_by_name(name) else {
            continue;
        };
        for service in file.services() {
            services.push(describe_service(&service, http.as_ref(), auth.as_ref(), json.as_ref()));
        }
    }
    Ok(ServiceDescription { services })
}

/// Files of the set that the base pool does not already provide.
fn pending_files(pool: &DescriptorPool, bytes: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    let set = RawFileSet::decode(bytes)
        .map_err(|e| Error::schema(OP, format!("not a descriptor set: {e}")))?;
    if set.file.is_empty() {
        return Err(Error::schema(OP, "descriptor set contains no files"));
    }

    let mut pending = Vec::with_capacity(set.file.len());
    for file in set.file {
        let name = RawFileName::decode(file.as_slice())
            .map_err(|e| Error::schema(OP, format!("not a file descriptor: {e}")))?
            .name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::schema(OP, "file descriptor without a name"))?;
        if pool.get_file_by_name(&name).is_none() {
            pending.push((name, file));
        }
    }
    Ok(pending)
}

fn describe_service(
    service: &ServiceDescriptor,
    http: Option<&ExtensionDescriptor>,
    auth: Option<&ExtensionDescriptor>,
    json: Option<&ExtensionDescriptor>,
) -> ServiceInfo {
    let options = service.options();
    let methods = service
        .methods()
        .map(|method| MethodDescription {
            name: method.name().to_string(),
            input_type: method.input().full_name().to_string(),
            output_type: method.output().full_name().to_string(),
            http: http.and_then(|ext| http_rule(&method.options(), ext)),
        })
        .collect();

    ServiceInfo {
        full_name: service.full_name().to_string(),
        auth_required: auth.is_some_and(|ext| bool_option(&options, ext)),
        use_json_response: json.is_some_and(|ext| bool_option(&options, ext)),
        methods,
    }
}

fn bool_option(options: &DynamicMessage, ext: &ExtensionDescriptor) -> bool {
    options.has_extension(ext) && options.get_extension(ext).as_bool().unwrap_or(false)
}

fn http_rule(options: &DynamicMessage, ext: &ExtensionDescriptor) -> Option<HttpRule> {
    if !options.has_extension(ext) {
        return None;
    }
    let value = options.get_extension(ext);
    let rule = value.as_message()?;
    let mut primary = parse_rule(rule)?;
    if let Some(bindings) = rule.get_field_by_name("additional_bindings") {
        if let Some(list) = bindings.as_list() {
            primary.additional_bindings = list
                .iter()
                .filter_map(Value::as_message)
                .filter_map(parse_rule)
                .collect();
        }
    }
    Some(primary)
}

/// One verb/path pair, ignoring nested bindings.
fn parse_rule(rule: &DynamicMessage) -> Option<HttpRule> {
    let body = string_field(rule, "body").unwrap_or_default();
    let verbs = [
        ("get", HttpVerb::Get),
        ("put", HttpVerb::Put),
        ("post", HttpVerb::Post),
        ("delete", HttpVerb::Delete),
        ("patch", HttpVerb::Patch),
    ];
    for (field, verb) in verbs {
        if let Some(path) = string_field(rule, field) {
            return Some(HttpRule {
                verb,
                path,
                body,
                additional_bindings: Vec::new(),
            });
        }
    }

    let custom = rule.get_field_by_name("custom")?;
    let custom = custom.as_message()?;
    let kind = string_field(custom, "kind")?;
    let path = string_field(custom, "path")?;
    Some(HttpRule {
        verb: HttpVerb::Custom(kind.to_ascii_uppercase()),
        path,
        body,
        additional_bindings: Vec::new(),
    })
}

fn string_field(message: &DynamicMessage, name: &str) -> Option<String> {
    let value = message.get_field_by_name(name)?;
    match value.as_ref() {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
