//! Run with: cargo run --package server --bin generate-types --features typescript

use std::fs;
use std::path::Path;

fn main() {
    println!("Generating TypeScript types...");

    let out_dir = Path::new("frontend/src/types/generated");

    if let Err(e) = fs::create_dir_all(out_dir) {
        eprintln!("Failed to create output directory: {}", e);
        std::process::exit(1);
    }

    #[cfg(feature = "typescript")]
    {
        use ts_rs::TS;

        let results = [
            ("MigrationRequest", poolshift_core::MigrationRequest::export_all_to(out_dir)),
            ("ExecutionSession", poolshift_core::ExecutionSession::export_all_to(out_dir)),
            ("ProgressEvent", events::ProgressEvent::export_all_to(out_dir)),
            ("SessionSummary", events::SessionSummary::export_all_to(out_dir)),
            ("NodePoolInfo", fleet::NodePoolInfo::export_all_to(out_dir)),
            (
                "ExecuteResponse",
                server::routes::sequence::ExecuteResponse::export_all_to(out_dir),
            ),
            (
                "SessionsResponse",
                server::routes::sequence::SessionsResponse::export_all_to(out_dir),
            ),
            (
                "NodePoolsResponse",
                server::routes::nodepools::NodePoolsResponse::export_all_to(out_dir),
            ),
            ("ErrorResponse", server::error::ErrorResponse::export_all_to(out_dir)),
        ];

        let mut failed = false;
        for (name, result) in results {
            if let Err(e) = result {
                eprintln!("Failed to export {}: {}", name, e);
                failed = true;
            }
        }
        if failed {
            std::process::exit(1);
        }
    }

    println!("TypeScript types generated in {}", out_dir.display());
}
