use tera::{Context, Tera};

use super::ReportView;
use crate::error::Result;

const TEMPLATE_NAME: &str = "report.html";
const TEMPLATE: &str = include_str!("../../templates/report.html.tera");

/// Render a report view to a standalone HTML page.
///
/// The template is compiled into the binary; the `.html` name keeps Tera's
/// autoescaping on for crawler names and tags.
pub fn render(view: &ReportView) -> Result<String> {
    let mut tera = Tera::default();
    tera.add_raw_template(TEMPLATE_NAME, TEMPLATE)?;
    let context = Context::from_serialize(view)?;
    Ok(tera.render(TEMPLATE_NAME, &context)?)
}
