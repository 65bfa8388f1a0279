//! Fuzz target for the TOML configuration parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! Feeds arbitrary text through `AppConfig::parse()` and, when it parses,
//! through hierarchy construction.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tether_core::HierarchyRegistry;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = tether_config::AppConfig::parse(s) {
            if let Ok(registry) = HierarchyRegistry::from_config(&config.hierarchy) {
                let types: Vec<_> = registry.types().collect();
                for a in &types {
                    for b in &types {
                        assert_eq!(
                            registry.is_supported(*a, *b).ok(),
                            registry.is_supported(*b, *a).ok()
                        );
                    }
                }
            }
        }
    }
});
