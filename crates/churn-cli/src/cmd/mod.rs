pub mod alerts;
pub mod dashboard;
pub mod metrics;
pub mod overview;
pub mod playbooks;
pub mod predict;
pub mod session;
pub mod settings;

use crate::output::{print_json, render_panel};
use churn_client::Resource;
use serde::Serialize;

/// Print one panel (or its value as JSON) and fail when nothing could be
/// loaded.
pub(crate) fn show_panel<T: Serialize>(
    title: &str,
    loading: bool,
    resource: &Resource<T>,
    json: bool,
    render: impl FnOnce(&T) -> String,
) -> anyhow::Result<()> {
    if json {
        if let Some(value) = &resource.value {
            print_json(value)?;
        }
    } else {
        print!("{}", render_panel(title, loading, resource, render));
    }
    match (&resource.value, &resource.error) {
        (None, Some(e)) => Err(anyhow::Error::new(e.clone())
            .context(format!("failed to load {}", title.to_lowercase()))),
        _ => Ok(()),
    }
}
