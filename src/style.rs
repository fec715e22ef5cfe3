//! The class table and per-class selection rules, loaded from a JSON data
//! file. The enumeration itself is data; nothing here hard-codes codes.
//!
//! A class name is the OSM `key:value` pair it matches, e.g.
//! `highway:motorway`. Selection says how an entity of that class is drawn
//! (point, line, polygon), whether polygons collapse to their centre, and
//! whether the abbreviated name form is preferred.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub code: i32,
    #[serde(default)]
    pub point: bool,
    #[serde(default)]
    pub line: bool,
    #[serde(default)]
    pub poly: bool,
    #[serde(default)]
    pub center: bool,
    #[serde(default)]
    pub abrev: bool,
}

#[derive(Deserialize, Debug)]
struct StyleFile {
    classes: Vec<ClassDef>,
}

pub struct Style {
    by_kv: HashMap<String, i32>,
    by_code: HashMap<i32, ClassDef>,
    generic_yes: HashSet<i32>,
    code_national_park: i32,
    code_protected_area: i32,
    code_national_park2: i32,
    code_national_monument3: i32,
    code_motorway: i32,
    code_motorway_junction: i32,
    code_capital: i32,
    code_state_capital: i32,
}

/// Classes a more specific tag may overwrite: none plus the catch-all
/// `<key>:yes` classes and every building subclass.
fn is_generic_yes_name(name: &str) -> bool {
    matches!(
        name,
        "building:yes"
            | "barrier:yes"
            | "office:yes"
            | "historic:yes"
            | "man_made:yes"
            | "tourism:yes"
    ) || name.starts_with("building:")
}

impl Style {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Style> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("open style {}", path.display()))?;
        let parsed: StyleFile = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parse style {}", path.display()))?;
        Self::from_classes(parsed.classes)
    }

    pub fn from_classes(classes: Vec<ClassDef>) -> Result<Style> {
        let mut by_kv = HashMap::new();
        let mut by_code = HashMap::new();
        let mut generic_yes = HashSet::new();
        generic_yes.insert(0);
        for class in classes {
            if class.code == 0 {
                anyhow::bail!("class {} uses reserved code 0", class.name);
            }
            if is_generic_yes_name(&class.name) {
                generic_yes.insert(class.code);
            }
            if by_kv.insert(class.name.clone(), class.code).is_some() {
                anyhow::bail!("duplicate class name {}", class.name);
            }
            by_code.insert(class.code, class);
        }
        let code_of = |name: &str| by_kv.get(name).copied().unwrap_or(0);
        Ok(Style {
            code_national_park: code_of("boundary:national_park"),
            code_protected_area: code_of("boundary:protected_area"),
            code_national_park2: code_of("boundary:national_park2"),
            code_national_monument3: code_of("boundary:national_monument3"),
            code_motorway: code_of("highway:motorway"),
            code_motorway_junction: code_of("highway:motorway_junction"),
            code_capital: code_of("place:capital"),
            code_state_capital: code_of("place:state_capital"),
            by_kv,
            by_code,
            generic_yes,
        })
    }

    /// Class code for a tag, 0 when the table has no entry. Tags with an
    /// unlisted value fall back to the key's `yes` catch-all.
    pub fn code_of(&self, k: &str, v: &str) -> i32 {
        if let Some(&code) = self.by_kv.get(&format!("{k}:{v}")) {
            return code;
        }
        if v != "no" && v != "yes" {
            if let Some(&code) = self.by_kv.get(&format!("{k}:yes")) {
                return code;
            }
        }
        0
    }

    pub fn class(&self, code: i32) -> Option<&ClassDef> {
        self.by_code.get(&code)
    }

    pub fn is_generic_yes(&self, code: i32) -> bool {
        self.generic_yes.contains(&code)
    }

    pub fn is_park(&self, code: i32) -> bool {
        code != 0 && (code == self.code_national_park || code == self.code_protected_area)
    }

    /// Class replacing a non-national park, by its `protect_class` value.
    pub fn park_remap(&self, protect_class: &str) -> Option<i32> {
        let code = match protect_class.trim() {
            "2" => self.code_national_park2,
            "3" => self.code_national_monument3,
            _ => 0,
        };
        (code != 0).then_some(code)
    }

    pub fn is_motorway(&self, code: i32) -> bool {
        code != 0 && (code == self.code_motorway || code == self.code_motorway_junction)
    }

    pub fn capital_code(&self, state: bool) -> i32 {
        if state {
            self.code_state_capital
        } else {
            self.code_capital
        }
    }

    pub fn selected_point(&self, code: i32) -> bool {
        self.class(code).map(|c| c.point).unwrap_or(false)
    }

    pub fn selected_line(&self, code: i32) -> bool {
        self.class(code).map(|c| c.line).unwrap_or(false)
    }

    pub fn selected_poly(&self, code: i32) -> bool {
        self.class(code).map(|c| c.poly).unwrap_or(false)
    }

    /// Whether a way or relation of this class is wanted on tiles at all.
    pub fn selected(&self, code: i32) -> bool {
        self.class(code)
            .map(|c| c.point || c.line || c.poly)
            .unwrap_or(false)
    }

    pub fn center(&self, code: i32) -> bool {
        self.class(code).map(|c| c.center).unwrap_or(false)
    }

    pub fn wants_abrev(&self, code: i32) -> bool {
        self.class(code).map(|c| c.abrev).unwrap_or(false)
    }

    /// Class-override policy for tags seen later on the same element:
    /// park classes always win and are never overwritten; otherwise a real
    /// class replaces a generic one.
    pub fn resolve_class(&self, current: i32, candidate: i32) -> i32 {
        if candidate == 0 {
            return current;
        }
        if self.is_park(candidate) {
            return candidate;
        }
        if self.is_park(current) {
            return current;
        }
        if self.is_generic_yes(current) {
            candidate
        } else {
            current
        }
    }
}

#[cfg(test)]
pub(crate) fn test_style() -> Style {
    let classes = vec![
        ClassDef {
            name: "highway:motorway".into(),
            code: 10,
            line: true,
            ..Default::default()
        },
        ClassDef {
            name: "highway:motorway_junction".into(),
            code: 11,
            point: true,
            ..Default::default()
        },
        ClassDef {
            name: "building:yes".into(),
            code: 20,
            poly: true,
            center: true,
            ..Default::default()
        },
        ClassDef {
            name: "building:house".into(),
            code: 21,
            poly: true,
            center: true,
            ..Default::default()
        },
        ClassDef {
            name: "boundary:national_park".into(),
            code: 30,
            point: true,
            poly: true,
            ..Default::default()
        },
        ClassDef {
            name: "boundary:protected_area".into(),
            code: 31,
            point: true,
            poly: true,
            ..Default::default()
        },
        ClassDef {
            name: "boundary:national_park2".into(),
            code: 32,
            point: true,
            poly: true,
            ..Default::default()
        },
        ClassDef {
            name: "boundary:national_monument3".into(),
            code: 33,
            point: true,
            poly: true,
            ..Default::default()
        },
        ClassDef {
            name: "place:town".into(),
            code: 40,
            point: true,
            abrev: true,
            ..Default::default()
        },
        ClassDef {
            name: "place:capital".into(),
            code: 41,
            point: true,
            ..Default::default()
        },
        ClassDef {
            name: "place:state_capital".into(),
            code: 42,
            point: true,
            ..Default::default()
        },
        ClassDef {
            name: "natural:peak".into(),
            code: 50,
            point: true,
            ..Default::default()
        },
        ClassDef {
            name: "highway:trunk".into(),
            code: 12,
            line: true,
            abrev: true,
            ..Default::default()
        },
        ClassDef {
            name: "waterway:river".into(),
            code: 60,
            line: true,
            ..Default::default()
        },
    ];
    Style::from_classes(classes).expect("test style")
}
