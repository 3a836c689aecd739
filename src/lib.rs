// Library for tests to access modules

pub mod collector;
pub mod config;
pub mod netdev;
pub mod routes;
pub mod version;
pub mod worker;
