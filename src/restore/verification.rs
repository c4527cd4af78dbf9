// opstool/src/restore/verification.rs
use std::path::Path;

use crate::config::MongoConfig;
use crate::restore::logic::collection_dump_path;

/// Checks that the extracted archive holds a dump for every configured
/// collection. Missing dumps are reported but do not abort the restore;
/// the replay stage skips them.
pub fn verify_collection_dumps(mongo: &MongoConfig, dump_root: &Path) -> usize {
    let mut missing = 0;
    for collection in &mongo.collections {
        let bson_path = collection_dump_path(dump_root, collection);
        if !bson_path.exists() {
            println!(
                "Missing dump for collection {} (expected {})",
                collection,
                bson_path.display()
            );
            missing += 1;
        }
    }
    if missing == 0 {
        println!(
            "✓ All {} collection dumps present",
            mongo.collections.len()
        );
    }
    missing
}
