use impkit::{Model, ModelClass, Registrator, SourceCatalog};

pub struct Customer;

impl Model for Customer {
    const NAME: &'static str = "Customer";
    const TABLE_NAME: Option<&'static str> = Some("customer");
}

pub struct Order;

impl Model for Order {
    const NAME: &'static str = "Order";
    const TABLE_NAME: Option<&'static str> = Some("orders");
}

/// Shared columns; no table of its own.
pub struct Timestamps;

impl Model for Timestamps {
    const NAME: &'static str = "Timestamps";
}

fn models() -> Vec<ModelClass> {
    vec![
        ModelClass::of::<Customer>(),
        ModelClass::of::<Order>(),
        ModelClass::of::<Timestamps>(),
    ]
}

fn register(catalog: &mut SourceCatalog) {
    catalog.models("models/shop.rs", models);
}

inventory::submit! { Registrator(register) }
