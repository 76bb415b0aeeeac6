pub mod bucket;
pub mod catalog;
pub mod disk;
pub mod gateway;
pub mod keys;
pub mod storage;
