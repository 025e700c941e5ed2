use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "level": { "type": "integer", "minimum": 1, "maximum": 3 },
            "techniques": { "type": "string", "pattern": "^[BETbet]+$" },
            "technique_priority": {
                "type": "array",
                "items": { "type": "string", "enum": ["boolean", "error", "time"] }
            },
            "timeout": { "type": "integer", "minimum": 1 },
            "delay": { "type": "number", "minimum": 0 },
            "timesec": { "type": "integer", "minimum": 1 },
            "retries": { "type": "integer", "minimum": 0 },
            "dbms": { "type": ["string", "null"], "enum": ["mysql", "postgresql", "mssql", "oracle", null] },
            "code": { "type": ["integer", "null"], "minimum": 100, "maximum": 599 },
            "string": { "type": ["string", "null"] },
            "not_string": { "type": ["string", "null"] },
            "start": { "type": "integer", "minimum": 0 },
            "stop": { "type": ["integer", "null"], "minimum": 1 },
            "charset": {
                "oneOf": [
                    { "type": "string", "enum": ["printable", "digits", "hex"] },
                    {
                        "type": "object",
                        "properties": { "custom": { "type": "string", "minLength": 1 } },
                        "required": ["custom"],
                        "additionalProperties": false
                    }
                ]
            },
            "expect": { "type": ["string", "null"] },
            "verify_resumed": { "type": "boolean" },
            "text_only": { "type": "boolean" },
            "prefix": { "type": ["string", "null"] },
            "suffix": { "type": ["string", "null"] },
            "test_parameter": { "type": ["array", "null"], "items": { "type": "string" } },
            "skip_urlencoding": { "type": "boolean" },
            "threads": { "type": "integer", "minimum": 1 },
            "batch": { "type": "boolean" },
            "flush_session": { "type": "boolean" },
            "output_dir": { "type": "string" },
            "dynamicity_threshold": { "$ref": "#/$defs/ratio" },
            "similarity_threshold": { "$ref": "#/$defs/ratio" },
            "time_safety_factor": { "$ref": "#/$defs/ratio" },
            "confirmation_pairs": { "type": "integer", "minimum": 2 },
            "verify_tls": { "type": "boolean" },
            "user_agent": { "type": ["string", "null"] }
        },
        "$defs": {
            "ratio": { "type": "number", "exclusiveMinimum": 0, "maximum": 1 }
        }
    })
});
