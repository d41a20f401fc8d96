pub mod output;
pub mod sensor;
