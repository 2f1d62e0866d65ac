use impkit::{Registrator, ResourceScope, ScopeRule, SourceCatalog, Unit, UnitSite};

mod routes;

fn account(site: UnitSite) -> anyhow::Result<Unit> {
    let mut unit = site.unit_from_config()?;
    unit.import_resources(
        "routes",
        &["routes"],
        Some(ResourceScope::empty().with(".", ScopeRule::All)),
    );
    Ok(unit)
}

fn register(catalog: &mut SourceCatalog) {
    catalog.unit("blueprints/www/children/account", account);
}

inventory::submit! { Registrator(register) }
