//! CUDA C specialization through NVRTC.
//!
//! The user writes the kernel as a (possibly templated) `__device__` function
//! named after the kernel, taking `pic_array<T, N>` for array arguments and
//! plain values for scalars. For each signature an `extern "C" __global__`
//! entry is generated whose parameter list is exactly the marshalled ABI:
//!
//! ```text
//! array of rank r:  void* meminfo, void* parent, long long len, long long itemsize,
//!                   T* data, long long shape[0..r], long long strides[0..r]
//! scalar:           T value
//! ```
//!
//! The entry rebuilds each array view and calls the device function.

use super::{entry_name, specialization_error};
use crate::error::Result;
use crate::kernel::{KernelBody, KernelSource};
use pic_kernel_runtime::{ArgKind, ArgumentSignature, ABI_VERSION};

#[cfg(feature = "cuda")]
use super::{check_arity, JitCompiler};
#[cfg(feature = "cuda")]
use pic_backends::KernelImage;

const PRELUDE: &str = r#"
template <typename T, int N>
struct pic_array {
    T* data;
    long long len;
    long long itemsize;
    long long shape[N];
    long long strides[N];

    __device__ T& at(long long i) const {
        return *(T*)((char*)data + i * strides[0]);
    }
    __device__ T& at(long long i, long long j) const {
        return *(T*)((char*)data + i * strides[0] + j * strides[1]);
    }
    __device__ T& at(long long i, long long j, long long k) const {
        return *(T*)((char*)data + i * strides[0] + j * strides[1] + k * strides[2]);
    }
};
"#;

/// CUDA C translation unit for one specialization of a CUDA kernel source.
pub fn generate_entry_source(source: &KernelSource, signature: &ArgumentSignature) -> Result<String> {
    let KernelBody::Cuda(body) = source.body() else {
        return Err(specialization_error(
            source,
            signature,
            "only CUDA C sources can be compiled with NVRTC",
        ));
    };

    let entry = entry_name(source.name(), signature);
    let mut params = Vec::new();
    let mut setup = Vec::new();
    let mut call_args = Vec::new();

    for (i, kind) in signature.kinds().iter().enumerate() {
        match *kind {
            ArgKind::Scalar(element) => {
                params.push(format!("{} a{i}", element.cuda_type()));
                call_args.push(format!("a{i}"));
            }
            ArgKind::Array { element, rank } => {
                let ty = element.cuda_type();
                params.push(format!("void* a{i}_meminfo"));
                params.push(format!("void* a{i}_parent"));
                params.push(format!("long long a{i}_len"));
                params.push(format!("long long a{i}_itemsize"));
                params.push(format!("{ty}* a{i}_data"));
                let shape: Vec<String> = (0..rank).map(|d| format!("a{i}_shape{d}")).collect();
                let strides: Vec<String> = (0..rank).map(|d| format!("a{i}_stride{d}")).collect();
                params.extend(shape.iter().map(|p| format!("long long {p}")));
                params.extend(strides.iter().map(|p| format!("long long {p}")));
                setup.push(format!(
                    "    pic_array<{ty}, {rank}> a{i} = {{ a{i}_data, a{i}_len, a{i}_itemsize, {{ {} }}, {{ {} }} }};",
                    shape.join(", "),
                    strides.join(", ")
                ));
                call_args.push(format!("a{i}"));
            }
        }
    }

    let mut out = format!(
        "// {} specialized for ({signature}), abi v{ABI_VERSION}\n",
        source.name()
    );
    out.push_str(PRELUDE);
    out.push('\n');
    out.push_str(body);
    out.push_str("\n\n");
    out.push_str(&format!(
        "extern \"C\" __global__ void {entry}({})\n{{\n",
        params.join(", ")
    ));
    for line in &setup {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&format!("    {}({});\n}}\n", source.name(), call_args.join(", ")));
    Ok(out)
}

/// Compiles CUDA C kernel sources to PTX with NVRTC.
#[cfg(feature = "cuda")]
#[derive(Debug, Clone, Default)]
pub struct NvrtcCompiler {
    arch: Option<&'static str>,
}

#[cfg(feature = "cuda")]
impl NvrtcCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target a specific virtual architecture, e.g. `"compute_70"`.
    pub fn with_arch(arch: &'static str) -> Self {
        Self { arch: Some(arch) }
    }
}

#[cfg(feature = "cuda")]
impl JitCompiler for NvrtcCompiler {
    fn name(&self) -> &'static str {
        "nvrtc"
    }

    fn specialize(&self, source: &KernelSource, signature: &ArgumentSignature) -> Result<KernelImage> {
        use cudarc::nvrtc::{compile_ptx_with_opts, CompileOptions};

        check_arity(source, signature)?;
        let src = generate_entry_source(source, signature)?;
        let opts = CompileOptions {
            arch: self.arch,
            ..Default::default()
        };
        let ptx = compile_ptx_with_opts(src, opts).map_err(|e| specialization_error(source, signature, format!("{e:?}")))?;

        Ok(KernelImage::Ptx {
            entry: entry_name(source.name(), signature),
            ptx: ptx.to_src(),
        })
    }
}
