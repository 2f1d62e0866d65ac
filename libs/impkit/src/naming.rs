//! Name conversions used for URL prefixes, template paths and table names.

use heck::{ToKebabCase, ToSnakeCase};

/// URL-friendly form of a name: `user_admin` → `user-admin`, `UserAdmin` → `user-admin`.
pub fn slug(value: &str) -> String {
    value.to_kebab_case()
}

/// `UserAdmin` → `user_admin`, `user-admin` → `user_admin`.
pub fn snake(value: &str) -> String {
    value.to_snake_case()
}

/// `"<table>.<field>"` for a model class, the form foreign keys use.
pub fn class_field(class_name: &str, field: &str) -> String {
    format!("{}.{}", snake(class_name), field)
}
