use axum::routing::get;
use axum::Json;
use impkit::{Registrator, ResourceModule, SourceCatalog, UnitMount};

use crate::host::UnitRoutes;

fn include(unit: &mut UnitMount) -> anyhow::Result<()> {
    let page = unit.tmpl("index.html");
    unit.attach(
        UnitRoutes::new()
            .route("/", get(move || async move { format!("www: {page}") }))
            .route("/hello", get(|| async { "hello from www" }))
            // The registry is published only once the server starts.
            .route(
                "/models",
                get(|| async { Json(impkit::model::global().map(|r| r.names()).unwrap_or_default()) }),
            ),
    );
    Ok(())
}

fn register(catalog: &mut SourceCatalog) {
    catalog.resource(
        "blueprints/www/routes/pages/index.rs",
        ResourceModule::new().unit_factory(impkit::DEFAULT_FACTORY, include),
    );
}

inventory::submit! { Registrator(register) }
