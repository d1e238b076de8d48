//! Compile-time defaults, merged by build.rs from library values and the
//! optional file named by `COROSWAP_CONFIG_RS`.

include!(concat!(env!("OUT_DIR"), "/coroswap_merged_config.rs"));
