pub mod delivery;
pub mod location;
pub mod profile;
pub mod proximity;
