pub mod bitbang;
pub mod bus;
pub mod imu;
pub mod led;
pub mod sim;
