pub mod channels;
pub mod harvest;
pub mod logout;
