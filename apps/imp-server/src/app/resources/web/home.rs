use axum::routing::get;
use axum::Json;
use impkit::{AppHost, Registrator, ResourceModule, SourceCatalog};
use serde_json::json;

use crate::host::AxumHost;

fn include(host: &mut dyn AppHost) -> anyhow::Result<()> {
    let host = host
        .downcast_mut::<AxumHost>()
        .ok_or_else(|| anyhow::anyhow!("home routes need the axum host"))?;
    host.route("/", get(|| async { Json(json!({ "app": "imp-server" })) }))
}

fn register(catalog: &mut SourceCatalog) {
    catalog.resource(
        "resources/web/home.rs",
        ResourceModule::new().app_factory(impkit::DEFAULT_FACTORY, include),
    );
}

inventory::submit! { Registrator(register) }
