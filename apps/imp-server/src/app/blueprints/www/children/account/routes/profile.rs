use axum::routing::get;
use impkit::{Registrator, ResourceModule, SourceCatalog, UnitMount};

use crate::host::UnitRoutes;

fn routes(unit: &mut UnitMount) -> anyhow::Result<()> {
    unit.attach(UnitRoutes::new().route("/profile", get(|| async { "profile" })));
    Ok(())
}

fn register(catalog: &mut SourceCatalog) {
    catalog.resource(
        "blueprints/www/children/account/routes/profile.rs",
        ResourceModule::new().unit_factory("routes", routes),
    );
}

inventory::submit! { Registrator(register) }
