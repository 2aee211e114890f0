//! MCP tool and prompt parameters
//!
//! Every tool takes the connection details of the target host alongside its
//! own arguments; the JSON schemas advertised to clients are derived from
//! these types.
//!
//! Available tools:
//! - `execute_linux_command` - Run a shell command verbatim
//! - `read_file_content` - `cat <file_path>`
//! - `get_disk_usage` - `df -h`
//! - `list_directory_contents` - `ls -l <path>` (default `.`)
//! - `get_system_info` - `uname -a && cat /etc/os-release`
//!
//! See `server.rs` for the dispatch.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ssh::ConnectionParams;

pub const EXECUTE_TOOL: &str = "execute_linux_command";
pub const READ_FILE_TOOL: &str = "read_file_content";
pub const DISK_USAGE_TOOL: &str = "get_disk_usage";
pub const LIST_DIRECTORY_TOOL: &str = "list_directory_contents";
pub const SYSTEM_INFO_TOOL: &str = "get_system_info";

/// Name of the chat prompt
pub const CHAT_PROMPT: &str = "dynamic_linux_chat_prompt";

/// Parameters for the execute_linux_command tool
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ExecuteParams {
    /// Shell command to execute on the Linux machine
    pub command: String,

    #[serde(flatten)]
    pub connection: ConnectionParams,
}

/// Parameters for the read_file_content tool
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ReadFileParams {
    /// Path of the file to read on the Linux machine
    pub file_path: String,

    #[serde(flatten)]
    pub connection: ConnectionParams,
}

/// Parameters for the list_directory_contents tool
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ListDirectoryParams {
    /// Directory to list (defaults to the login directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(flatten)]
    pub connection: ConnectionParams,
}

/// Parameters for tools that only need connection details
/// (get_disk_usage, get_system_info)
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct HostParams {
    #[serde(flatten)]
    pub connection: ConnectionParams,
}

/// Arguments of the dynamic_linux_chat_prompt prompt
#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct ChatPromptParams {
    /// Question or request about the Linux machine
    pub query: String,

    #[serde(flatten)]
    pub connection: ConnectionParams,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_params_deserialize() {
        let json = r#"{"command": "ls -l", "host": "192.168.1.100", "username": "user", "password": "mypass"}"#;
        let params: ExecuteParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.command, "ls -l");
        assert_eq!(params.connection.host, "192.168.1.100");
        assert_eq!(params.connection.password.as_deref(), Some("mypass"));
    }

    #[test]
    fn test_read_file_params_with_key() {
        let json = r#"{"file_path": "/etc/os-release", "host": "vm", "username": "user", "private_key_path": "~/.ssh/mykey"}"#;
        let params: ReadFileParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.file_path, "/etc/os-release");
        assert_eq!(
            params.connection.private_key_path.as_deref(),
            Some("~/.ssh/mykey")
        );
    }

    #[test]
    fn test_list_directory_path_is_optional() {
        let json = r#"{"host": "vm", "username": "user", "password": "pw", "port": 2222}"#;
        let params: ListDirectoryParams = serde_json::from_str(json).unwrap();
        assert!(params.path.is_none());
        assert_eq!(params.connection.port, Some(2222));
    }

    #[test]
    fn test_missing_command_rejected() {
        let json = r#"{"host": "vm", "username": "user"}"#;
        assert!(serde_json::from_str::<ExecuteParams>(json).is_err());
    }

    #[test]
    fn test_schema_includes_connection_fields() {
        let schema = serde_json::to_value(schemars::schema_for!(ExecuteParams)).unwrap();
        let properties = schema["properties"].as_object().unwrap();
        for field in ["command", "host", "username", "password", "private_key_path", "port"] {
            assert!(properties.contains_key(field), "missing {}", field);
        }

        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert!(required.contains(&"command"));
        assert!(required.contains(&"host"));
        assert!(!required.contains(&"password"));
    }
}
