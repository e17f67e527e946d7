#![allow(dead_code)]

use sacred_browser::store::MemoryStore;
use serde_json::{Value, json};

pub const URI: &str = "mongodb://localhost:27017";

// Two databases: `lab` with a prefixed study that has its own GridFS root
// plus the default `runs`, and `archive` in the legacy layout.
pub fn lab_dump() -> Value {
    json!({
        "lab": {
            "mnist.runs": [
                {
                    "_id": 1,
                    "status": "COMPLETED",
                    "config": {"lr": 0.1, "seed": 1, "model": {"layers": 2}},
                    "result": [0.9, 0.1],
                    "host": {"hostname": "node-a"}
                },
                {
                    "_id": 2,
                    "status": "FAILED",
                    "config": {"lr": 0.01, "seed": 2, "model": {"layers": 3}},
                    "result": null
                },
                {
                    "_id": 3,
                    "status": "COMPLETED",
                    "config": {"lr": 0.1, "seed": 3, "model": {"layers": 2}},
                    "result": [0.8, 0.3]
                },
                {
                    "_id": 4,
                    "status": "RUNNING",
                    "config": {"lr": 0.001, "seed": 4, "model": {"layers": 2}, "dropout": 0.5}
                }
            ],
            "mnist.files": [],
            "mnist.chunks": [],
            "runs": [
                {"_id": "a1", "status": "COMPLETED", "config": {"lr": 1}, "result": 0.5}
            ]
        },
        "archive": {
            "experiments": [
                {"_id": 10, "status": "INTERRUPTED", "config": {"batch": 32}}
            ]
        }
    })
}

pub fn lab_store() -> MemoryStore {
    MemoryStore::from_json(&lab_dump()).unwrap()
}
