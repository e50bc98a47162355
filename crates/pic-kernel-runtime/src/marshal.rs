use crate::abi::{params_per_arg, KernelParam};
use crate::args::KernelArg;
use crate::error::{AbiError, Result};
use crate::signature::ArgumentSignature;

/// Flatten a call's arguments into the entry-point parameter list.
///
/// Array storage is referenced by handle only; nothing is copied. The
/// arguments are validated the same way [`ArgumentSignature::of`] does, so a
/// list that produced a signature always marshals.
pub fn marshal_args(args: &[KernelArg]) -> Result<Vec<KernelParam>> {
    let signature = ArgumentSignature::of(args)?;
    let capacity = signature.kinds().iter().map(params_per_arg).sum();
    let mut params = Vec::with_capacity(capacity);

    for (index, arg) in args.iter().enumerate() {
        match arg {
            KernelArg::Scalar(scalar) => params.push(KernelParam::Scalar(*scalar)),
            KernelArg::Array(array) => {
                let len = array
                    .len()
                    .and_then(|n| i64::try_from(n).ok())
                    .ok_or(AbiError::SizeOverflow { index })?;
                params.push(KernelParam::Null);
                params.push(KernelParam::Null);
                params.push(KernelParam::Int(len));
                params.push(KernelParam::Int(array.element.itemsize() as i64));
                params.push(KernelParam::Buffer(array.buffer));
                params.extend(array.shape.iter().map(|&d| KernelParam::Int(d as i64)));
                params.extend(array.strides.iter().map(|&s| KernelParam::Int(s as i64)));
            }
            KernelArg::Unsupported { type_name } => {
                return Err(AbiError::UnsupportedArgument {
                    index,
                    type_name: type_name.clone(),
                })
            }
        }
    }

    debug_assert_eq!(params.len(), capacity);
    Ok(params)
}
