//! Naming fixup
//!
//! Function shapes are built with positional names (`args0`, `ret0`). When a
//! metadata lookup is configured, the declared names and docs from source
//! replace them. Lookup failures and arity mismatches only log: the
//! positional names are kept as they are, never partially overwritten.

use reflect_shape_metadata::{CodeAddr, Lookup, VarMetadata};
use tracing::{debug, warn};

use crate::config::Config;
use crate::rtype::{Signature, TypeTable};
use crate::shape::{Function, Param};

/// Positional parameter placeholder
pub(crate) fn param_placeholder(i: usize) -> String {
    format!("args{i}")
}

/// Positional result placeholder
pub(crate) fn return_placeholder(i: usize) -> String {
    format!("ret{i}")
}

/// Overwrite positional names of `func` with the names declared in source.
///
/// With `is_method`, the structural parameter list starts with the receiver;
/// the receiver name reported by the lookup is prepended to the declared
/// parameter names.
pub(crate) fn apply(
    lookup: &Lookup,
    config: &Config,
    addr: CodeAddr,
    fullname: &str,
    is_method: bool,
    func: &mut Function,
) {
    let metadata = match lookup.lookup_function(addr) {
        Ok(metadata) => metadata,
        Err(err) => {
            warn!(function = fullname, error = %err, "arglist lookup failed");
            return;
        }
    };

    let offset = usize::from(is_method && metadata.recv.is_some());
    let expected = func.params.len().checked_sub(offset);
    if expected != Some(metadata.params.len()) {
        warn!(
            function = fullname,
            got = metadata.params.len(),
            want = func.params.len() as i64 - offset as i64,
            "argument count mismatch, keeping positional names"
        );
    } else {
        let recv = metadata.recv.iter().take(offset).map(|name| VarMetadata {
            name: name.clone(),
            doc: String::new(),
        });
        rename(&mut func.params, recv.chain(metadata.params.iter().cloned()));
    }

    if metadata.returns.len() != func.returns.len() {
        warn!(
            function = fullname,
            got = metadata.returns.len(),
            want = func.returns.len(),
            "return count mismatch, keeping positional names"
        );
    } else {
        rename(&mut func.returns, metadata.returns.iter().cloned());
    }

    func.recv = metadata.recv;
    if !config.skip_docs {
        func.doc = metadata.doc;
    }
    debug!(function = fullname, params = ?func.param_names(), "arglist fixed up");
}

/// Attach the doc and receiver declared for `addr`, keeping the current names.
pub(crate) fn attach_doc(
    lookup: &Lookup,
    config: &Config,
    addr: CodeAddr,
    fullname: &str,
    func: &mut Function,
) {
    match lookup.lookup_function(addr) {
        Ok(metadata) => {
            func.recv = metadata.recv;
            if !config.skip_docs {
                func.doc = metadata.doc;
            }
        }
        Err(err) => warn!(function = fullname, error = %err, "doc lookup failed"),
    }
}

fn rename(slots: &mut [Param], declared: impl Iterator<Item = VarMetadata>) {
    for (slot, var) in slots.iter_mut().zip(declared) {
        slot.name = var.name;
        slot.doc = var.doc;
    }
}

/// Fill empty names left by unnamed declarations.
///
/// Parameters become `ctx` for `context.Context` and `arg{i}` otherwise.
/// Results become `err` for the first `error`, `err{i}` for later ones and
/// `ret{i}` otherwise.
pub(crate) fn fill_names(types: &TypeTable, config: &Config, sig: &Signature, func: &mut Function) {
    if config.fill_arg_names {
        for (i, (param, &ty)) in func.params.iter_mut().zip(&sig.params).enumerate() {
            if param.name.is_empty() {
                param.name = if types.is_context(ty) {
                    "ctx".to_string()
                } else {
                    format!("arg{i}")
                };
            }
        }
    }

    if config.fill_return_names {
        let mut err_used = false;
        for (i, (ret, &ty)) in func.returns.iter_mut().zip(&sig.results).enumerate() {
            if !ret.name.is_empty() {
                continue;
            }
            ret.name = if types.is_error(ty) && err_used {
                format!("err{i}")
            } else if types.is_error(ty) {
                err_used = true;
                "err".to_string()
            } else {
                return_placeholder(i)
            };
        }
    }
}
