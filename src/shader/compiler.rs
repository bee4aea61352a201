//! GLSL stage compilation and stage linking via naga.

use super::{ShaderError, ShaderStage};
use naga::front::glsl::{Frontend, Options};
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, EntryPoint, Module, ResourceBinding, TypeInner};
use std::collections::btree_map::{BTreeMap, Entry};
use tracing::{debug, error};

/// Entry point name the GLSL front end gives `void main()`.
pub const ENTRY_POINT: &str = "main";

/// A single stage that parsed, validated and translated to WGSL.
#[derive(Debug)]
pub struct CompiledShader {
    stage: ShaderStage,
    module: Module,
    wgsl: String,
}

impl CompiledShader {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// WGSL translation handed to wgpu.
    pub fn wgsl(&self) -> &str {
        &self.wgsl
    }
}

/// Compiles one stage of GLSL source.
///
/// Failures are logged with the stage name before being returned, so a
/// caller that only checks the result still leaves a trace of which stage
/// broke and why.
pub fn compile_stage(stage: ShaderStage, source: &str) -> Result<CompiledShader, ShaderError> {
    let result = compile(stage, source);
    match &result {
        Ok(compiled) => debug!(
            "Compiled {} shader ({} bytes of WGSL)",
            stage,
            compiled.wgsl.len()
        ),
        Err(ShaderError::Compile { log, .. }) => {
            error!("Failed to compile {} shader", stage);
            error!("{}", log);
        }
        Err(e) => error!("Failed to compile {} shader: {}", stage, e),
    }
    result
}

fn compile(stage: ShaderStage, source: &str) -> Result<CompiledShader, ShaderError> {
    let fail = |log: String| ShaderError::Compile { stage, log };

    let mut frontend = Frontend::default();
    let options = Options::from(stage.to_naga());
    let module = frontend
        .parse(&options, source)
        .map_err(|e| fail(e.emit_to_string(source)))?;

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    let info = validator
        .validate(&module)
        .map_err(|e| fail(e.emit_to_string(source)))?;

    let wgsl = naga::back::wgsl::write_string(&module, &info, naga::back::wgsl::WriterFlags::empty())
        .map_err(|e| fail(format!("WGSL generation error: {e}")))?;

    Ok(CompiledShader {
        stage,
        module,
        wgsl,
    })
}

/// A named member of a uniform block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformMember {
    pub name: String,
    /// Byte offset inside the block
    pub offset: u32,
    /// Byte size of the member
    pub size: u32,
}

/// A uniform block reflected from one or both stages.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformBlock {
    /// Block type name, if the source gave one
    pub name: Option<String>,
    pub binding: u32,
    /// Total byte size of the block
    pub size: u32,
    pub members: Vec<UniformMember>,
    /// Stages that read the block
    pub visibility: wgpu::ShaderStages,
}

impl UniformBlock {
    pub fn member(&self, name: &str) -> Option<&UniformMember> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// Two compiled stages whose interfaces agree, plus their merged uniforms.
#[derive(Debug)]
pub struct LinkedStages {
    pub vertex: CompiledShader,
    pub fragment: CompiledShader,
    /// Uniform blocks in group 0, ordered by binding
    pub uniforms: Vec<UniformBlock>,
}

/// Links a vertex and a fragment stage.
///
/// Refuses to link if either stage failed to compile and hands back that
/// failure, vertex first.
pub fn link_stages(
    vertex: Result<CompiledShader, ShaderError>,
    fragment: Result<CompiledShader, ShaderError>,
) -> Result<LinkedStages, ShaderError> {
    let (vertex, fragment) = match (vertex, fragment) {
        (Ok(vertex), Ok(fragment)) => (vertex, fragment),
        (Err(e), _) | (_, Err(e)) => return Err(e),
    };

    let result = link(vertex, fragment);
    if let Err(e) = &result {
        error!("{}", e);
    }
    result
}

fn link(vertex: CompiledShader, fragment: CompiledShader) -> Result<LinkedStages, ShaderError> {
    if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
        return Err(link_error(format!(
            "expected a vertex and a fragment stage, got {} and {}",
            vertex.stage, fragment.stage
        )));
    }

    let vs_entry = entry_point(&vertex)?;
    let fs_entry = entry_point(&fragment)?;

    let outputs = vertex_outputs(&vertex.module, vs_entry);
    for (location, input) in fragment_inputs(&fragment.module, fs_entry) {
        match outputs.get(&location) {
            None => {
                return Err(link_error(format!(
                    "fragment input at location {location} is not written by the vertex stage"
                )))
            }
            Some(output) if *output != input => {
                return Err(link_error(format!(
                    "type mismatch at location {location}: vertex writes {output:?}, fragment reads {input:?}"
                )))
            }
            Some(_) => {}
        }
    }

    let mut uniforms: BTreeMap<u32, UniformBlock> = BTreeMap::new();
    for stage in [&vertex, &fragment] {
        for block in uniform_blocks(stage)? {
            match uniforms.entry(block.binding) {
                Entry::Vacant(slot) => {
                    slot.insert(block);
                }
                Entry::Occupied(mut slot) => {
                    let existing = slot.get_mut();
                    if existing.size != block.size || existing.members != block.members {
                        return Err(link_error(format!(
                            "uniform block at binding {} is declared differently by the two stages",
                            block.binding
                        )));
                    }
                    existing.visibility |= block.visibility;
                }
            }
        }
    }

    debug!("Linked shader stages with {} uniform block(s)", uniforms.len());
    Ok(LinkedStages {
        vertex,
        fragment,
        uniforms: uniforms.into_values().collect(),
    })
}

fn link_error(log: String) -> ShaderError {
    ShaderError::Link { log }
}

fn entry_point(shader: &CompiledShader) -> Result<&EntryPoint, ShaderError> {
    let stage = shader.stage.to_naga();
    shader
        .module
        .entry_points
        .iter()
        .find(|ep| ep.stage == stage && ep.name == ENTRY_POINT)
        .ok_or_else(|| link_error(format!("{} stage has no `{ENTRY_POINT}` entry point", shader.stage)))
}

/// Location-bound values written by the vertex entry point.
fn vertex_outputs(module: &Module, entry: &EntryPoint) -> BTreeMap<u32, TypeInner> {
    let mut outputs = BTreeMap::new();
    if let Some(result) = &entry.function.result {
        collect_locations(module, result.ty, result.binding.as_ref(), &mut outputs);
    }
    outputs
}

/// Location-bound values read by the fragment entry point.
fn fragment_inputs(module: &Module, entry: &EntryPoint) -> BTreeMap<u32, TypeInner> {
    let mut inputs = BTreeMap::new();
    for argument in &entry.function.arguments {
        collect_locations(module, argument.ty, argument.binding.as_ref(), &mut inputs);
    }
    inputs
}

fn collect_locations(
    module: &Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&Binding>,
    into: &mut BTreeMap<u32, TypeInner>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => {
            into.insert(*location, module.types[ty].inner.clone());
        }
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.ty, member.binding.as_ref(), into);
                }
            }
        }
    }
}

fn uniform_blocks(shader: &CompiledShader) -> Result<Vec<UniformBlock>, ShaderError> {
    let module = &shader.module;
    let mut blocks = Vec::new();

    for (_, var) in module.global_variables.iter() {
        let Some(ResourceBinding { group, binding }) = var.binding else {
            continue;
        };
        let name = var.name.as_deref().unwrap_or("<unnamed>");

        if group != 0 {
            return Err(link_error(format!(
                "{} stage binds `{name}` to group {group}; only group 0 is supported",
                shader.stage
            )));
        }
        if var.space != AddressSpace::Uniform {
            return Err(link_error(format!(
                "{} stage binds `{name}` in {:?} space; only uniform blocks are supported",
                shader.stage, var.space
            )));
        }

        let ty = &module.types[var.ty];
        let (members, size) = match &ty.inner {
            TypeInner::Struct { members, span } => (members, *span),
            other => {
                return Err(link_error(format!(
                    "uniform `{name}` at binding {binding} is not a block: {other:?}"
                )))
            }
        };

        let members = members
            .iter()
            .filter_map(|m| {
                Some(UniformMember {
                    name: m.name.clone()?,
                    offset: m.offset,
                    size: module.types[m.ty].inner.size(module.to_ctx()),
                })
            })
            .collect();

        blocks.push(UniformBlock {
            name: ty.name.clone(),
            binding,
            size,
            members,
            visibility: shader.stage.to_wgpu(),
        });
    }

    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    const VERTEX: &str = "\
#version 450
layout(location = 0) in vec2 position;
void main() {
    gl_Position = vec4(position, 0.0, 1.0);
}
";

    const FRAGMENT: &str = "\
#version 450
layout(location = 0) out vec4 color;
layout(set = 0, binding = 0) uniform Uniforms {
    vec4 u_Color;
};
void main() {
    color = u_Color;
}
";

    #[test]
    fn test_minimal_stages_compile_and_link() {
        let vertex = compile_stage(ShaderStage::Vertex, VERTEX).unwrap();
        assert_eq!(vertex.stage(), ShaderStage::Vertex);
        assert!(!vertex.wgsl().is_empty());

        let linked = link_stages(Ok(vertex), compile_stage(ShaderStage::Fragment, FRAGMENT)).unwrap();
        assert_eq!(linked.uniforms.len(), 1);
    }

    /// Collects formatted log output in memory.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_vertex_syntax_error_names_stage() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let broken = "#version 450\nvoid main() { gl_Position = vec4(1.0) }\n";
        let err = tracing::subscriber::with_default(subscriber, || {
            compile_stage(ShaderStage::Vertex, broken).unwrap_err()
        });
        assert_eq!(err.stage(), Some(ShaderStage::Vertex));
        assert!(err.to_string().starts_with("failed to compile vertex shader"));

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("ERROR"));
        assert!(output.contains("Failed to compile vertex shader"));
        assert!(!output.contains("fragment"));
    }

    #[test]
    fn test_link_refuses_failed_stage() {
        let vertex = compile_stage(ShaderStage::Vertex, "not glsl");
        let fragment = compile_stage(ShaderStage::Fragment, "also not glsl");
        let err = link_stages(vertex, fragment).unwrap_err();
        assert_eq!(err.stage(), Some(ShaderStage::Vertex));

        let vertex = compile_stage(ShaderStage::Vertex, VERTEX);
        let fragment = compile_stage(ShaderStage::Fragment, "also not glsl");
        let err = link_stages(vertex, fragment).unwrap_err();
        assert_eq!(err.stage(), Some(ShaderStage::Fragment));
    }

    #[test]
    fn test_link_rejects_swapped_stages() {
        let vertex = compile_stage(ShaderStage::Vertex, VERTEX);
        let err = link_stages(compile_stage(ShaderStage::Fragment, FRAGMENT), vertex).unwrap_err();
        assert!(matches!(err, ShaderError::Link { .. }));
    }

    #[test]
    fn test_link_rejects_unwritten_fragment_input() {
        let fragment = "\
#version 450
layout(location = 0) in vec3 v_Normal;
layout(location = 0) out vec4 color;
void main() {
    color = vec4(v_Normal, 1.0);
}
";
        let err = link_stages(
            compile_stage(ShaderStage::Vertex, VERTEX),
            compile_stage(ShaderStage::Fragment, fragment),
        )
        .unwrap_err();
        match err {
            ShaderError::Link { log } => assert!(log.contains("location 0")),
            other => panic!("expected link error, got {other:?}"),
        }
    }

    #[test]
    fn test_link_rejects_mismatched_varying_type() {
        let vertex = "\
#version 450
layout(location = 0) in vec2 position;
layout(location = 0) out vec2 v_Uv;
void main() {
    v_Uv = position;
    gl_Position = vec4(position, 0.0, 1.0);
}
";
        let fragment = "\
#version 450
layout(location = 0) in vec4 v_Uv;
layout(location = 0) out vec4 color;
void main() {
    color = v_Uv;
}
";
        let err = link_stages(
            compile_stage(ShaderStage::Vertex, vertex),
            compile_stage(ShaderStage::Fragment, fragment),
        )
        .unwrap_err();
        assert!(err.to_string().contains("type mismatch"));
    }

    #[test]
    fn test_reflects_uniform_block() {
        let linked = link_stages(
            compile_stage(ShaderStage::Vertex, VERTEX),
            compile_stage(ShaderStage::Fragment, FRAGMENT),
        )
        .unwrap();

        let block = &linked.uniforms[0];
        assert_eq!(block.binding, 0);
        assert_eq!(block.size, 16);
        assert_eq!(block.visibility, wgpu::ShaderStages::FRAGMENT);
        assert_eq!(
            block.member("u_Color"),
            Some(&UniformMember {
                name: "u_Color".to_string(),
                offset: 0,
                size: 16,
            })
        );
        assert!(block.member("u_Missing").is_none());
    }
}
