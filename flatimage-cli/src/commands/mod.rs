pub mod bind;
pub mod boot;
pub mod casefold;
pub mod desktop;
pub mod env;
pub mod exec;
pub mod instance;
pub mod layer;
pub mod notify;
pub mod overlay;
pub mod perms;
pub mod recipe;
pub mod remote;
pub mod unshare;
pub mod version;
