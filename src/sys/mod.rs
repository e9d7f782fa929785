//! Platform layer: CPU discovery, thread affinity and cache geometry.

use cfg_if::cfg_if;

cfg_if! {
    if #[cfg(target_os = "linux")] {
        #[path = "linux.rs"]
        mod imp;
    } else {
        // No affinity, no cache geometry. Workers float.
        #[path = "generic.rs"]
        mod imp;
    }
}

pub use imp::{
    allowed_cpus, pin_current_thread, thread_siblings, CACHE_LINE_SIZE_HINT, NUM_CPUS,
};
