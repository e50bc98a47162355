use super::{check_arity, entry_name, specialization_error, JitCompiler};
use crate::error::Result;
use crate::kernel::{KernelBody, KernelSource};
use pic_backends::KernelImage;
use pic_kernel_runtime::ArgumentSignature;

/// Highest array rank the host compiler specializes for.
pub const MAX_SPECIALIZED_RANK: usize = 3;

/// Specializes host kernel bodies for the host reference backend.
///
/// A host body is already executable, so specialization binds it to one
/// signature and entry name; the backend's unmarshaller then checks every
/// launch against that signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCompiler;

impl HostCompiler {
    pub const fn new() -> Self {
        Self
    }
}

impl JitCompiler for HostCompiler {
    fn name(&self) -> &'static str {
        "host"
    }

    fn specialize(&self, source: &KernelSource, signature: &ArgumentSignature) -> Result<KernelImage> {
        check_arity(source, signature)?;

        let body = match source.body() {
            KernelBody::Host(body) => body,
            KernelBody::Cuda(_) => {
                return Err(specialization_error(
                    source,
                    signature,
                    "CUDA C source cannot run on the host backend",
                ))
            }
        };

        if signature.max_rank() > MAX_SPECIALIZED_RANK {
            return Err(specialization_error(
                source,
                signature,
                format!(
                    "array rank {} exceeds the supported maximum of {MAX_SPECIALIZED_RANK}",
                    signature.max_rank()
                ),
            ));
        }

        Ok(KernelImage::Host {
            entry: entry_name(source.name(), signature),
            signature: signature.clone(),
            body: body.clone(),
        })
    }
}
