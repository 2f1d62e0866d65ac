use impkit::{Registrator, SourceCatalog, Unit, UnitSite};

fn audit(site: UnitSite) -> anyhow::Result<Unit> {
    Ok(site.unit_from_config()?)
}

fn register(catalog: &mut SourceCatalog) {
    catalog.unit("blueprints/admin/children/audit", audit);
}

inventory::submit! { Registrator(register) }
