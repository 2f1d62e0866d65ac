use impkit::{Registrator, SourceCatalog, Unit, UnitSite};

mod children;

fn admin(site: UnitSite) -> anyhow::Result<Unit> {
    let mut unit = site.unit_from_config()?;
    unit.import_models("models")
        .import_nested_units("children");
    Ok(unit)
}

fn register(catalog: &mut SourceCatalog) {
    catalog.unit("blueprints/admin", admin);
}

inventory::submit! { Registrator(register) }
