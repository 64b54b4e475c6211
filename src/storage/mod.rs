pub mod pagefile;
pub mod recordfile;
