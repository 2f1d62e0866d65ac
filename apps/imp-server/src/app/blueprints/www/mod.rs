use impkit::{Registrator, SourceCatalog, Unit, UnitSite};

mod children;
mod routes;

fn www(site: UnitSite) -> anyhow::Result<Unit> {
    let mut unit = site.unit_from_config()?;
    unit.import_resources("routes", &[], None)
        .import_nested_units("children");
    Ok(unit)
}

fn register(catalog: &mut SourceCatalog) {
    catalog.unit("blueprints/www", www);
}

inventory::submit! { Registrator(register) }
