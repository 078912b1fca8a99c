//! Turns a traced part outline into a triangle mesh with boundary conditions,
//! ready for a linear finite-element solver.
//!
//! Pipeline: contour hierarchy -> [`geometry`] -> gmsh via [`mesher`] ->
//! [`assembler`] and [`boundary`] -> interactive [`session`] driving
//! [`selection`] -> [`export`].

pub mod assembler;
pub mod boundary;
pub mod datatypes;
pub mod error;
pub mod export;
pub mod geometry;
pub mod input;
pub mod mesher;
pub mod selection;
pub mod session;
