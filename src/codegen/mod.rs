//! Evaluation-order walk used by the code generators.
//!
//! Both backends lower a function by visiting its body in evaluation order
//! and reporting every element to the function's instrumentor before the
//! element's own code. Shared subtrees are generated, and reported, at each
//! place they are used; the instrumentor keeps increments unique. Nested
//! function declarations are lowered as functions of their own.

pub mod native;

use crate::core::adaptor::{ElementId, ElementKind, FuncId, IrAdaptor};
use crate::core::error::CompileResult;
use crate::coverage::instrumentation::Instrumentor;

/// Walk the body of `func`, returning the number of elements reached.
pub fn walk_function<A: IrAdaptor + ?Sized>(
    adaptor: &A,
    func: FuncId,
    instrumentor: &mut dyn Instrumentor,
) -> CompileResult<usize> {
    let Some(body) = adaptor.func_body(func) else {
        return Ok(0);
    };

    let mut reached = 0;
    let mut stack = vec![body];
    while let Some(element) = stack.pop() {
        instrumentor.on_element_reached(element)?;
        reached += 1;

        if matches!(adaptor.element_kind(element), ElementKind::FunctionDecl(_)) {
            continue;
        }
        let children: Vec<ElementId> = adaptor.element_children(element).collect();
        stack.extend(children.into_iter().rev());
    }

    log::trace!("Reached {} elements in {}", reached, adaptor.func_link_name(func));
    Ok(reached)
}

/// Functions that get code of their own: every coverable function with a body.
pub fn functions_to_lower<A: IrAdaptor + ?Sized>(adaptor: &A) -> Vec<FuncId> {
    let mut funcs = Vec::new();
    for file in adaptor.files() {
        for func in adaptor.file_functions(file) {
            if adaptor.func_is_inline(func) || adaptor.func_is_external(func) {
                continue;
            }
            if adaptor.func_body(func).is_some() {
                funcs.push(func);
            }
        }
    }
    funcs
}
