//! Shared fixtures for integration tests

#![allow(dead_code)]

use cel_expr::{NativeType, Type, TypeDescriptor};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
}

impl NativeType for Point {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::new("testdata.Point")
            .field("X", Type::Double)
            .field("Y", Type::Double)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    #[serde(rename = "P1")]
    pub p1: Point,
    #[serde(rename = "P2")]
    pub p2: Point,
}

impl NativeType for Rectangle {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::new("testdata.Rectangle")
            .field("P1", Point::descriptor().as_type())
            .field("P2", Point::descriptor().as_type())
    }
}

pub fn rect() -> Rectangle {
    Rectangle {
        p1: Point { x: 1.0, y: 2.0 },
        p2: Point { x: 3.0, y: 4.0 },
    }
}

/// Install a test subscriber once; respects `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
