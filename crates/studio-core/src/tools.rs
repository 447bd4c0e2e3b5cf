//! Tool name mapping between callers and the Studio plugin.
//!
//! Callers use snake_case tool names; the plugin dispatches on PascalCase.
//! Names without a mapping are forwarded unchanged so the plugin can grow
//! tools without a server release.

/// Known snake_case to plugin tool name pairs.
pub const TOOL_NAMES: &[(&str, &str)] = &[
    ("get_workspace", "GetWorkspace"),
    ("get_workspace_files", "GetWorkspaceFiles"),
    ("get_file_content", "GetFileContent"),
    ("update_file_content", "UpdateFileContent"),
    ("run_code", "RunCode"),
    ("create_part", "CreatePart"),
    ("insert_model", "InsertModel"),
    ("manage_datastore", "ManageDatastore"),
    ("create_gui", "CreateGUI"),
    ("get_console_output", "GetConsoleOutput"),
];

/// Resolve the plugin-side name for `name`.
pub fn studio_tool_name(name: &str) -> &str {
    TOOL_NAMES
        .iter()
        .find(|(snake, _)| *snake == name)
        .map_or(name, |&(_, studio)| studio)
}
