// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Store two people and find them again by first name.
//!
//! Run with `JSONDB_LOG=debug cargo run --example people [data_dir]`;
//! without an argument the data directory comes from JSONDB_DIR.

#![allow(clippy::print_stdout)]

use jsondb::{Database, data_dir_with_override, gen_id_from_seed};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Person {
    #[serde(rename = "ID")]
    id: String,
    f_name: String,
    l_name: String,
    age: u32,
}

fn person(first: &str, last: &str, age: u32) -> Person {
    Person {
        id: gen_id_from_seed(&format!("{first}{last}")),
        f_name: first.to_string(),
        l_name: last.to_string(),
        age,
    }
}

#[tokio::main]
async fn main() -> jsondb::Result<()> {
    diagnostics::init();

    let data_dir = data_dir_with_override(std::env::args().nth(1).map(PathBuf::from))?;
    println!("Opening database at: {}", data_dir.display());
    let db = Database::open(&data_dir).await?;

    for p in [person("Phenix", "Rizen", 96), person("Phenix", "Fallen", 69)] {
        let _ = db.put("people", &p.id, &p).await?;
    }

    let people: Vec<Person> = db.get_where("people", "FName", "Phenix", None).await?;
    for p in &people {
        println!("Name: {} {}, Age: {}", p.f_name, p.l_name, p.age);
    }
    Ok(())
}
