#![allow(dead_code)]

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

const CATEGORIES: [&str; 4] = ["novel", "poetry", "essay", "comics"];
const LANGUAGES: [&str; 3] = ["fr", "en", "ar"];
const EDITORS: [&str; 3] = ["Gallimard", "Hachette", "Folio"];

const TITLES: [&str; 5] = ["Candide", "Les Misérables", "Alcools", "Nadja", "Germinal"];
const AUTHORS: [&str; 5] = ["Voltaire", "Hugo", "Apollinaire", "Breton", "Zola"];
const GENRES: [&str; 3] = ["roman", "poésie", "conte"];
const STATES: [&str; 3] = ["bon", "moyen", "mauvais"];

/// Deterministic marketplace listings with a price driven by the features.
pub fn marketplace_csv(rows: usize) -> String {
    let mut csv = String::from(
        "title,author,category,language,editor,edition,totalPages,damagedPages,age,price\n",
    );
    for i in 0..rows {
        let title = TITLES[i % TITLES.len()];
        let author = AUTHORS[(i / 2) % AUTHORS.len()];
        let editor = EDITORS[i % EDITORS.len()];
        let category = CATEGORIES[i % CATEGORIES.len()];
        let language = LANGUAGES[i % LANGUAGES.len()];
        let edition = 1980 + (i * 7) % 40;
        let pages = 80 + (i * 37) % 600;
        let damaged = (i * 5) % 12;
        let age = 2025 - edition;
        let price = 4.0 + pages as f64 * 0.03 - damaged as f64 * 0.4
            + if category == "essay" { 6.0 } else { 0.0 }
            + age as f64 * 0.15;
        writeln!(
            csv,
            "{title},{author},{category},{language},{editor},{edition},{pages},{damaged},{age},{price:.2}"
        )
        .unwrap();
    }
    csv
}

/// Deterministic rare book listings in the bid book layout.
pub fn bidbook_csv(rows: usize) -> String {
    let mut csv = String::from(
        "titre,auteur,genre,langue,éditeur,état_général,année_édition,nombre_pages,\
         pages_arrachées,nombre_exemplaires_connus,édition_originale,reliure_cuir,avec_dédicace,prix\n",
    );
    for i in 0..rows {
        let title = TITLES[i % TITLES.len()];
        let author = AUTHORS[i % AUTHORS.len()];
        let genre = GENRES[i % GENRES.len()];
        let state = STATES[(i / 2) % STATES.len()];
        let year = 1750 + (i * 13) % 250;
        let pages = 120 + (i * 29) % 500;
        let torn = (i * 3) % 9;
        let copies = 5 + (i * 41) % 800;
        let original = i % 4 == 0;
        let leather = i % 3 == 0;
        let signed = i % 7 == 0;
        let price = 2000.0 - year as f64 * 0.8 + pages as f64 * 0.2 - torn as f64 * 5.0
            - copies as f64 * 0.1
            + if original { 150.0 } else { 0.0 }
            + if leather { 60.0 } else { 0.0 }
            + if signed { 300.0 } else { 0.0 };
        writeln!(
            csv,
            "{title},{author},{genre},français,Gallimard,{state},{year},{pages},{torn},{copies},{original},{leather},{},{price:.2}",
            u8::from(signed)
        )
        .unwrap();
    }
    csv
}

pub fn write_dataset(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}
