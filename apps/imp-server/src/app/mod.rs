//! Bundled demo application. Its folder tree is composed at startup; every source
//! file registers itself with the catalog under its path relative to this folder.

mod blueprints;
mod models;
mod resources;
