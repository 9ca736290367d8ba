//! Programmatic construction of descriptor sets.
//!
//! Produces the same bytes `protoc --include_imports --descriptor_set_out`
//! would for a small service annotated with `google.api.http` rules and
//! the gateway service options. Used by tests and the `gatewayctl demo`
//! command.

use prost::Message;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{DescriptorProto, FieldDescriptorProto, FileDescriptorProto};

const HTTP_PROTO: &str = "google/api/http.proto";
const ANNOTATIONS_PROTO: &str = "google/api/annotations.proto";
const OPTIONS_PROTO: &str = "gateway/options.proto";
const DESCRIPTOR_PROTO: &str = "google/protobuf/descriptor.proto";

const HTTP_EXTENSION_NUMBER: i32 = 72_295_728;
const AUTH_EXTENSION_NUMBER: i32 = 50_001;
const JSON_EXTENSION_NUMBER: i32 = 50_002;

#[derive(Clone, PartialEq, Message)]
struct FileSetProto {
    #[prost(bytes = "vec", repeated, tag = "1")]
    file: Vec<Vec<u8>>,
}

/// `FileDescriptorProto` subset whose options keep extension fields.
#[derive(Clone, PartialEq, Message)]
struct ServiceFileProto {
    #[prost(string, optional, tag = "1")]
    name: Option<String>,
    #[prost(string, optional, tag = "2")]
    package: Option<String>,
    #[prost(string, repeated, tag = "3")]
    dependency: Vec<String>,
    #[prost(message, repeated, tag = "4")]
    message_type: Vec<DescriptorProto>,
    #[prost(message, repeated, tag = "6")]
    service: Vec<ServiceProto>,
    #[prost(string, optional, tag = "12")]
    syntax: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
struct ServiceProto {
    #[prost(string, optional, tag = "1")]
    name: Option<String>,
    #[prost(message, repeated, tag = "2")]
    method: Vec<MethodProto>,
    #[prost(message, optional, tag = "3")]
    options: Option<ServiceOptionsProto>,
}

#[derive(Clone, PartialEq, Message)]
struct ServiceOptionsProto {
    #[prost(bool, optional, tag = "50001")]
    auth_required: Option<bool>,
    #[prost(bool, optional, tag = "50002")]
    json_response: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
struct MethodProto {
    #[prost(string, optional, tag = "1")]
    name: Option<String>,
    #[prost(string, optional, tag = "2")]
    input_type: Option<String>,
    #[prost(string, optional, tag = "3")]
    output_type: Option<String>,
    #[prost(message, optional, tag = "4")]
    options: Option<MethodOptionsProto>,
}

#[derive(Clone, PartialEq, Message)]
struct MethodOptionsProto {
    #[prost(message, optional, tag = "72295728")]
    http: Option<HttpRuleProto>,
}

#[derive(Clone, PartialEq, Message)]
struct HttpRuleProto {
    #[prost(string, optional, tag = "2")]
    get: Option<String>,
    #[prost(string, optional, tag = "3")]
    put: Option<String>,
    #[prost(string, optional, tag = "4")]
    post: Option<String>,
    #[prost(string, optional, tag = "5")]
    delete: Option<String>,
    #[prost(string, optional, tag = "6")]
    patch: Option<String>,
    #[prost(string, optional, tag = "7")]
    body: Option<String>,
    #[prost(message, optional, tag = "8")]
    custom: Option<CustomPatternProto>,
    #[prost(message, repeated, tag = "11")]
    additional_bindings: Vec<HttpRuleProto>,
}

#[derive(Clone, PartialEq, Message)]
struct CustomPatternProto {
    #[prost(string, optional, tag = "1")]
    kind: Option<String>,
    #[prost(string, optional, tag = "2")]
    path: Option<String>,
}

#[derive(Debug, Clone)]
struct FixtureMethod {
    name: String,
    route: Option<(String, String)>,
    bindings: Vec<(String, String)>,
}

/// One service, optionally annotated, encodable as a descriptor set.
#[derive(Debug, Clone)]
pub struct ServiceFixture {
    package: String,
    service: String,
    methods: Vec<FixtureMethod>,
    auth_required: bool,
    json_response: bool,
    imports: Vec<String>,
}

impl ServiceFixture {
    pub fn new(package: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            service: service.into(),
            methods: Vec::new(),
            auth_required: false,
            json_response: false,
            imports: Vec::new(),
        }
    }

    /// Add a method mapped to `verb path`. Unknown verbs become custom patterns.
    pub fn route(mut self, method: impl Into<String>, verb: &str, path: impl Into<String>) -> Self {
        self.methods.push(FixtureMethod {
            name: method.into(),
            route: Some((verb.to_string(), path.into())),
            bindings: Vec::new(),
        });
        self
    }

    /// Add an additional binding to the most recently added route.
    pub fn binding(mut self, verb: &str, path: impl Into<String>) -> Self {
        if let Some(method) = self.methods.last_mut() {
            method.bindings.push((verb.to_string(), path.into()));
        }
        self
    }

    /// Add a method without an HTTP mapping.
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.methods.push(FixtureMethod {
            name: method.into(),
            route: None,
            bindings: Vec::new(),
        });
        self
    }

    pub fn auth_required(mut self, required: bool) -> Self {
        self.auth_required = required;
        self
    }

    pub fn json_response(mut self, json: bool) -> Self {
        self.json_response = json;
        self
    }

    /// Declare an extra import, which must be resolvable for the set to load.
    pub fn import(mut self, file: impl Into<String>) -> Self {
        self.imports.push(file.into());
        self
    }

    /// Fully-qualified service name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.package, self.service)
    }

    /// Encode this service together with the option schemas it uses.
    pub fn encode(&self) -> Vec<u8> {
        encode_all(std::slice::from_ref(self))
    }

    fn file_name(&self) -> String {
        format!(
            "{}/{}.proto",
            self.package.replace('.', "/"),
            self.service.to_ascii_lowercase()
        )
    }

    fn to_file(&self) -> ServiceFileProto {
        let mut messages = Vec::new();
        let mut methods = Vec::new();
        for method in &self.methods {
            let request = format!("{}Request", method.name);
            let response = format!("{}Response", method.name);
            messages.push(DescriptorProto {
                name: Some(request.clone()),
                ..Default::default()
            });
            messages.push(DescriptorProto {
                name: Some(response.clone()),
                ..Default::default()
            });
            methods.push(MethodProto {
                name: Some(method.name.clone()),
                input_type: Some(format!(".{}.{}", self.package, request)),
                output_type: Some(format!(".{}.{}", self.package, response)),
                options: method.route.as_ref().map(|(verb, path)| MethodOptionsProto {
                    http: Some(HttpRuleProto {
                        additional_bindings: method
                            .bindings
                            .iter()
                            .map(|(verb, path)| http_rule(verb, path))
                            .collect(),
                        ..http_rule(verb, path)
                    }),
                }),
            });
        }

        let mut dependency = vec![ANNOTATIONS_PROTO.to_string(), OPTIONS_PROTO.to_string()];
        dependency.extend(self.imports.iter().cloned());

        ServiceFileProto {
            name: Some(self.file_name()),
            package: Some(self.package.clone()),
            dependency,
            message_type: messages,
            service: vec![ServiceProto {
                name: Some(self.service.clone()),
                method: methods,
                options: Some(ServiceOptionsProto {
                    auth_required: self.auth_required.then_some(true),
                    json_response: self.json_response.then_some(true),
                }),
            }],
            syntax: Some("proto3".to_string()),
        }
    }
}

/// Encode several services into one descriptor set.
pub fn encode_all(services: &[ServiceFixture]) -> Vec<u8> {
    let mut files = vec![
        http_file().encode_to_vec(),
        annotations_file().encode_to_vec(),
        options_file().encode_to_vec(),
    ];
    files.extend(services.iter().map(|s| s.to_file().encode_to_vec()));
    FileSetProto { file: files }.encode_to_vec()
}

fn http_rule(verb: &str, path: &str) -> HttpRuleProto {
    let path = Some(path.to_string());
    let mut rule = HttpRuleProto::default();
    match verb.to_ascii_uppercase().as_str() {
        "GET" => rule.get = path,
        "PUT" => rule.put = path,
        "POST" => {
            rule.post = path;
            rule.body = Some("*".to_string());
        }
        "DELETE" => rule.delete = path,
        "PATCH" => {
            rule.patch = path;
            rule.body = Some("*".to_string());
        }
        _ => {
            rule.custom = Some(CustomPatternProto {
                kind: Some(verb.to_string()),
                path,
            })
        }
    }
    rule
}

fn field(name: &str, number: i32, kind: Type, type_name: Option<&str>) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(kind as i32),
        type_name: type_name.map(str::to_string),
        json_name: Some(name.to_string()),
        ..Default::default()
    }
}

fn extension(name: &str, number: i32, kind: Type, type_name: Option<&str>, extendee: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        extendee: Some(extendee.to_string()),
        ..field(name, number, kind, type_name)
    }
}

fn http_file() -> FileDescriptorProto {
    let string = |name: &str, number: i32| field(name, number, Type::String, None);
    FileDescriptorProto {
        name: Some(HTTP_PROTO.to_string()),
        package: Some("google.api".to_string()),
        message_type: vec![
            DescriptorProto {
                name: Some("HttpRule".to_string()),
                field: vec![
                    string("selector", 1),
                    string("get", 2),
                    string("put", 3),
                    string("post", 4),
                    string("delete", 5),
                    string("patch", 6),
                    string("body", 7),
                    field("custom", 8, Type::Message, Some(".google.api.CustomHttpPattern")),
                    FieldDescriptorProto {
                        label: Some(Label::Repeated as i32),
                        ..field("additional_bindings", 11, Type::Message, Some(".google.api.HttpRule"))
                    },
                    string("response_body", 12),
                ],
                ..Default::default()
            },
            DescriptorProto {
                name: Some("CustomHttpPattern".to_string()),
                field: vec![string("kind", 1), string("path", 2)],
                ..Default::default()
            },
        ],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

fn annotations_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(ANNOTATIONS_PROTO.to_string()),
        package: Some("google.api".to_string()),
        dependency: vec![HTTP_PROTO.to_string(), DESCRIPTOR_PROTO.to_string()],
        extension: vec![extension(
            "http",
            HTTP_EXTENSION_NUMBER,
            Type::Message,
            Some(".google.api.HttpRule"),
            ".google.protobuf.MethodOptions",
        )],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

fn options_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some(OPTIONS_PROTO.to_string()),
        package: Some("gateway".to_string()),
        dependency: vec![DESCRIPTOR_PROTO.to_string()],
        extension: vec![
            extension(
                "auth_required",
                AUTH_EXTENSION_NUMBER,
                Type::Bool,
                None,
                ".google.protobuf.ServiceOptions",
            ),
            extension(
                "json_response",
                JSON_EXTENSION_NUMBER,
                Type::Bool,
                None,
                ".google.protobuf.ServiceOptions",
            ),
        ],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encodes_every_file() {
        let raw = ServiceFixture::new("echo.v1", "Echo")
            .route("Echo", "GET", "/api/v1/echo")
            .encode();
        let set = prost_types::FileDescriptorSet::decode(raw.as_slice()).unwrap();
        let names: Vec<_> = set.file.iter().filter_map(|f| f.name.clone()).collect();
        assert_eq!(
            names,
            vec![HTTP_PROTO, ANNOTATIONS_PROTO, OPTIONS_PROTO, "echo/v1/echo.proto"]
        );
    }

    #[test]
    fn test_full_name() {
        assert_eq!(ServiceFixture::new("echo.v1", "Echo").full_name(), "echo.v1.Echo");
    }
}
