// Crate entry point. Re-export modules so tests and binaries can import them easily.
//
// Responsibilities
// - Only declare and expose modules. No business logic here.
//
// How it is used
// - Tests and the `work_log` binary import modules from this crate root.

pub mod shared {
    pub mod core {
        pub mod primitives;
    }
}

pub mod core {
    pub mod ports;
    pub mod work_log;
}

pub mod application {
    pub mod errors;
    pub mod repository;
    pub mod command_handlers {
        pub mod amend_entry_handler;
        pub mod delete_entry_handler;
        pub mod record_entry_handler;
        pub mod staging;
    }
    pub mod query_handlers {
        pub mod work_log_queries;
    }
}

pub mod adapters {
    pub mod file_system {
        pub mod file_attachment_store;
        pub mod file_snapshot_store;
    }
    pub mod in_memory {
        pub mod in_memory_attachment_store;
        pub mod in_memory_snapshot_store;
    }
}

pub mod shell;
