pub mod enums;
pub mod schema;
pub mod state;
pub mod utils;

#[cfg(test)]
pub mod test_utils;
