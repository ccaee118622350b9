//! Opening a database written by a pre-instance build.

use purramid_core::state::{SpotlightShape, SpotlightState};
use purramid_core::{Config, Database, FeatureState, FeatureType, InstanceCoordinator, StateStore};
use rusqlite::Connection;
use std::sync::Arc;

fn write_legacy_db(path: &std::path::Path, rows: &[(i64, &str)]) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE spotlights (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            instance_id INTEGER,
            center_x INTEGER,
            center_y INTEGER,
            radius INTEGER,
            width INTEGER,
            height INTEGER,
            shape TEXT,
            is_locked INTEGER
        );",
    )
    .unwrap();
    for (instance_id, shape) in rows {
        conn.execute(
            "INSERT INTO spotlights (instance_id, center_x, center_y, radius, width, height, shape, is_locked)
             VALUES (?1, 500, 400, 120, 320, 180, ?2, 1)",
            rusqlite::params![instance_id, shape],
        )
        .unwrap();
    }
}

#[test]
fn legacy_rows_become_instances() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("purramid.db");
    write_legacy_db(&path, &[(1, "circle"), (3, "rectangle"), (3, "oval"), (0, "square")]);

    let db = Database::open(&path).unwrap();
    let records = db.list_active(FeatureType::Spotlight).unwrap();
    let ids: Vec<u32> = records.iter().map(|r| r.instance_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);

    // The newest row keeps ID 3.
    let three = SpotlightState::from_record(&records[2]);
    assert_eq!(three.shape, SpotlightShape::Oval);
    assert_eq!((three.geometry.x, three.geometry.y), (340, 310));
    assert!(three.geometry.locked);

    let one = SpotlightState::from_record(&records[0]);
    assert_eq!((one.geometry.width, one.geometry.height), (240, 240));
}

#[tokio::test]
async fn migrated_spotlights_restore_into_coordinator() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("purramid.db");
    write_legacy_db(&path, &[(2, "circle"), (2, "circle"), (9, "square")]);

    let db = Arc::new(Database::open(&path).unwrap());
    let coord = InstanceCoordinator::new(db, &Config::default());
    assert_eq!(coord.restore_all(), 3);
    assert_eq!(coord.active(FeatureType::Spotlight), vec![1, 2, 3]);

    // Reopening does not import twice.
    drop(coord);
    let db = Database::open(&path).unwrap();
    assert_eq!(db.list_active(FeatureType::Spotlight).unwrap().len(), 3);
}
