//! Splits a combined shader file into its vertex and fragment sections.
//!
//! A line containing `#shader` selects the section that the following lines
//! belong to: `#shader vertex` or `#shader fragment`. Lines seen before the
//! first marker are dropped.

use super::{ShaderError, ShaderSourcePair, ShaderStage};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info};

const MARKER: &str = "#shader";

/// Reads and splits the shader file at `path`.
pub fn load_shader_source(path: impl AsRef<Path>) -> Result<ShaderSourcePair, ShaderError> {
    let path = path.as_ref();
    let io_error = |source| ShaderError::Io {
        path: path.to_path_buf(),
        source,
    };

    info!("Loading shader from {:?}", path);
    let file = File::open(path).map_err(io_error)?;
    let sources = parse_shader_source(BufReader::new(file)).map_err(io_error)?;
    debug!(
        "Shader {:?}: {} bytes vertex, {} bytes fragment",
        path,
        sources.vertex.len(),
        sources.fragment.len()
    );
    Ok(sources)
}

/// Splits shader text read from `reader` into its two sections.
pub fn parse_shader_source(reader: impl BufRead) -> io::Result<ShaderSourcePair> {
    let mut sources = ShaderSourcePair::default();
    let mut current: Option<ShaderStage> = None;

    for line in reader.lines() {
        let line = line?;

        if line.contains(MARKER) {
            if line.contains("vertex") {
                current = Some(ShaderStage::Vertex);
            } else if line.contains("fragment") {
                current = Some(ShaderStage::Fragment);
            }
            continue;
        }

        let target = match current {
            Some(ShaderStage::Vertex) => &mut sources.vertex,
            Some(ShaderStage::Fragment) => &mut sources.fragment,
            None => continue,
        };
        target.push_str(&line);
        target.push('\n');
    }

    Ok(sources)
}

/// Splits in-memory shader text.
pub fn parse_shader_str(text: &str) -> ShaderSourcePair {
    // Reading from a byte slice cannot fail.
    parse_shader_source(text.as_bytes()).unwrap_or_default()
}

impl std::str::FromStr for ShaderSourcePair {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(parse_shader_str(s))
    }
}
