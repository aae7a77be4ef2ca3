//! Name-addressed parameter registries consumed by shaders.
//!
//! Two tiers exist at runtime: a *global* set owned by the runtime and
//! mutable between iterations, and *local* sets attached to compiled
//! shaders which are filled at compile time and read-only afterwards.

use glam::{Vec3, Vec4};
use hashbrown::HashMap;
use std::fmt::Write as _;

/// A set of named parameters of the five supported kinds.
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    pub int_parameters: HashMap<String, i32>,
    pub float_parameters: HashMap<String, f32>,
    pub vector_parameters: HashMap<String, Vec3>,
    pub color_parameters: HashMap<String, Vec4>,
    pub string_parameters: HashMap<String, String>,
}

impl ParameterSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.int_parameters.is_empty()
            && self.float_parameters.is_empty()
            && self.vector_parameters.is_empty()
            && self.color_parameters.is_empty()
            && self.string_parameters.is_empty()
    }

    pub fn set_int(&mut self, name: impl Into<String>, value: i32) {
        self.int_parameters.insert(name.into(), value);
    }

    pub fn set_float(&mut self, name: impl Into<String>, value: f32) {
        self.float_parameters.insert(name.into(), value);
    }

    pub fn set_vector(&mut self, name: impl Into<String>, value: Vec3) {
        self.vector_parameters.insert(name.into(), value);
    }

    pub fn set_color(&mut self, name: impl Into<String>, value: Vec4) {
        self.color_parameters.insert(name.into(), value);
    }

    pub fn set_string(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.string_parameters.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn int(&self, name: &str) -> Option<i32> {
        self.int_parameters.get(name).copied()
    }

    #[must_use]
    pub fn float(&self, name: &str) -> Option<f32> {
        self.float_parameters.get(name).copied()
    }

    #[must_use]
    pub fn vector(&self, name: &str) -> Option<Vec3> {
        self.vector_parameters.get(name).copied()
    }

    #[must_use]
    pub fn color(&self, name: &str) -> Option<Vec4> {
        self.color_parameters.get(name).copied()
    }

    #[must_use]
    pub fn string(&self, name: &str) -> Option<&str> {
        self.string_parameters.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn int_or(&self, name: &str, def: i32) -> i32 {
        self.int(name).unwrap_or(def)
    }

    #[must_use]
    pub fn float_or(&self, name: &str, def: f32) -> f32 {
        self.float(name).unwrap_or(def)
    }

    #[must_use]
    pub fn vector_or(&self, name: &str, def: Vec3) -> Vec3 {
        self.vector(name).unwrap_or(def)
    }

    #[must_use]
    pub fn color_or(&self, name: &str, def: Vec4) -> Vec4 {
        self.color(name).unwrap_or(def)
    }

    /// Merge `other` into this set.
    ///
    /// With `replace` set, entries of `other` overwrite entries already
    /// present; otherwise existing entries are kept.
    pub fn merge_from(&mut self, other: &Self, replace: bool) {
        if replace {
            for (k, v) in &other.int_parameters {
                self.int_parameters.insert(k.clone(), *v);
            }
            for (k, v) in &other.float_parameters {
                self.float_parameters.insert(k.clone(), *v);
            }
            for (k, v) in &other.vector_parameters {
                self.vector_parameters.insert(k.clone(), *v);
            }
            for (k, v) in &other.color_parameters {
                self.color_parameters.insert(k.clone(), *v);
            }
            for (k, v) in &other.string_parameters {
                self.string_parameters.insert(k.clone(), v.clone());
            }
        } else {
            for (k, v) in &other.int_parameters {
                self.int_parameters.entry(k.clone()).or_insert(*v);
            }
            for (k, v) in &other.float_parameters {
                self.float_parameters.entry(k.clone()).or_insert(*v);
            }
            for (k, v) in &other.vector_parameters {
                self.vector_parameters.entry(k.clone()).or_insert(*v);
            }
            for (k, v) in &other.color_parameters {
                self.color_parameters.entry(k.clone()).or_insert(*v);
            }
            for (k, v) in &other.string_parameters {
                self.string_parameters
                    .entry(k.clone())
                    .or_insert_with(|| v.clone());
            }
        }
    }

    /// Dump the set as a multi-line string for debug purposes.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (k, v) in &self.int_parameters {
            let _ = writeln!(out, "[i32] {k} = {v}");
        }
        for (k, v) in &self.float_parameters {
            let _ = writeln!(out, "[f32] {k} = {v}");
        }
        for (k, v) in &self.vector_parameters {
            let _ = writeln!(out, "[vec3] {k} = [{}, {}, {}]", v.x, v.y, v.z);
        }
        for (k, v) in &self.color_parameters {
            let _ = writeln!(out, "[color] {k} = [{}, {}, {}, {}]", v.x, v.y, v.z, v.w);
        }
        for (k, v) in &self.string_parameters {
            let _ = writeln!(out, "[str] {k} = {v}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn getters_return_defaults_on_miss() {
        let mut set = ParameterSet::new();
        set.set_int("a", 42);
        assert_eq!(set.int_or("a", 0), 42);
        assert_eq!(set.int_or("b", 7), 7);
        assert_eq!(set.float_or("a", 1.5), 1.5);
    }

    #[test]
    fn merge_keep_does_not_overwrite() {
        let mut a = ParameterSet::new();
        a.set_int("x", 1);
        let mut b = ParameterSet::new();
        b.set_int("x", 2);
        b.set_int("y", 3);

        a.merge_from(&b, false);
        assert_eq!(a.int_or("x", 0), 1);
        assert_eq!(a.int_or("y", 0), 3);

        a.merge_from(&b, true);
        assert_eq!(a.int_or("x", 0), 2);
    }

    #[test]
    fn dump_lists_all_kinds() {
        let mut set = ParameterSet::new();
        set.set_int("i", 1);
        set.set_float("f", 2.0);
        set.set_vector("v", Vec3::ONE);
        set.set_color("c", Vec4::ONE);
        set.set_string("s", "hello");

        let dump = set.dump();
        assert!(dump.contains("[i32] i = 1"));
        assert!(dump.contains("[str] s = hello"));
        assert_eq!(dump.lines().count(), 5);
    }
}
