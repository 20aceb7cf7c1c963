//! Generated code for the test schemas built in `build.rs`.

pub mod demo {
    pub mod shapes {
        include!(concat!(env!("OUT_DIR"), "/demo/shapes/shapes.rs"));
    }

    pub mod legacy {
        include!(concat!(env!("OUT_DIR"), "/demo/legacy/legacy.rs"));
    }

    pub mod plain {
        include!(concat!(env!("OUT_DIR"), "/demo/plain/plain.rs"));
    }
}

pub use demo::shapes::{Color, Point, Shape};
