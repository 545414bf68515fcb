#[path = "../common/mod.rs"]
mod common;

mod test_mod;
mod test_payload;
mod test_platform;
mod test_registry;
mod test_service_worker;
