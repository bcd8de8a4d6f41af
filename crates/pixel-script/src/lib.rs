//! The pixel script language: a restricted, JavaScript-flavored expression
//! language mapping one pixel's sampled band values to an RGBA tuple.
//!
//! A script sees each declared raster input as a named array of band values
//! and must `return` an array of 3 or 4 numeric channels. The language is
//! pure by construction: no I/O, no globals, no mutation of the sample
//! environment. `compile` runs a static capability pass so that undeclared
//! input references and unknown calls fail before any rendering work
//! begins; numeric edge cases (division by zero, out-of-range indexing)
//! are *not* errors and propagate as NaN/Infinity for the evaluation
//! engine's single clamp policy.
//!
//! ```
//! use pixel_script::compile;
//!
//! let script = compile(
//!     "return [rgb[0], rgb[1], rgb[2], 255]",
//!     &["rgb".to_string()],
//! )
//! .unwrap();
//! let bands = vec![vec![10.0, 20.0, 30.0]];
//! let out = script.eval_pixel(&bands).unwrap();
//! assert_eq!(out, [10.0, 20.0, 30.0, 255.0]);
//! ```

mod ast;
mod check;
mod eval;
mod lexer;
mod parser;

pub use eval::PixelFault;

use ast::Program;
use tile_common::{ScriptTileError, ScriptTileResult};

/// A compiled, side-effect-free pixel function.
///
/// Shared read-only across worker threads for the duration of one render;
/// compilation happens once before the pixel loop begins.
#[derive(Debug)]
pub struct CompiledScript {
    program: Program,
    input_names: Vec<String>,
}

impl CompiledScript {
    /// Declared input names, in declaration order. Band sample vectors
    /// passed to [`eval_pixel`](Self::eval_pixel) must follow this order.
    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    /// Evaluate the script for one pixel.
    ///
    /// `bands[i]` holds the band values sampled from input `i` (an
    /// all-NaN vector for a nodata pixel). Returns raw channel values;
    /// rounding and clamping to [0, 255] is the evaluation engine's job.
    /// A 3-channel return gets an opaque alpha of 255.
    pub fn eval_pixel(&self, bands: &[Vec<f64>]) -> Result<[f64; 4], PixelFault> {
        eval::eval_program(&self.program, &self.input_names, bands)
    }
}

/// Compile a pixel script against the set of declared input names.
///
/// Fails with `Syntax` on malformed source, `UndeclaredInputReference`
/// when the script reads a name that is neither a declared input nor a
/// local binding, and `CapabilityViolation` on constructs outside the
/// pixel-function contract (unknown calls, shadowing an input or builtin).
pub fn compile(source: &str, declared_inputs: &[String]) -> ScriptTileResult<CompiledScript> {
    let tokens = lexer::tokenize(source).map_err(|e| ScriptTileError::Syntax(e.to_string()))?;
    let program = parser::parse(tokens).map_err(|e| ScriptTileError::Syntax(e.to_string()))?;
    check::check(&program, declared_inputs)?;
    Ok(CompiledScript {
        program,
        input_names: declared_inputs.to_vec(),
    })
}
