use anyhow::Result;
use chrono::Utc;
use serde::Serialize;

use crate::config::WindowArgs;
use crate::window::ReportWindow;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowOutput {
    #[serde(flatten)]
    pub window: ReportWindow,
    pub data_key: String,
}

/// Resolves the window the flags describe, without touching the network.
pub fn describe(args: &WindowArgs) -> Result<WindowOutput> {
    let window = args.resolve(Utc::now())?;
    Ok(WindowOutput {
        data_key: window.data_key(),
        window,
    })
}

/// Entry point of the `window` subcommand: prints the window as JSON.
pub fn run(args: &WindowArgs) -> Result<()> {
    let output = describe(args)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
