pub mod bounce;
pub mod campaign;
pub mod recipient;
