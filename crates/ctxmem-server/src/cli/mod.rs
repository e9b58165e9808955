// crates/ctxmem-server/src/cli/mod.rs
// CLI surface: run as an MCP server (default) or invoke one tool directly.

use clap::{Parser, Subcommand};

pub mod serve;
mod tool;

pub use serve::run_mcp_server;
pub use tool::run_tool;

#[derive(Parser)]
#[command(name = "ctxmem-server")]
#[command(about = "Context Memory Engine: durable conversational memory for AI agents")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run as an MCP server over stdio (default)
    Serve,

    /// Execute one tool directly and print its JSON result
    Tool {
        /// Tool name (e.g. add_message, retrieve_context)
        #[arg(index = 1)]
        name: String,

        /// JSON arguments (e.g. '{"contextId": "c1", "message": "hi", "role": "user"}')
        #[arg(index = 2)]
        args: String,
    },
}
