//! Handlers shipped with the engine.

use crate::arch::is_browser;

use super::{CompileStep, HandlerError, SourceHandler};

/// Passes `.js` sources through to the linker unchanged.
#[derive(Debug, Default)]
pub struct JavaScriptHandler;

impl SourceHandler for JavaScriptHandler {
  fn compile(&self, step: &mut CompileStep<'_>) -> Result<(), HandlerError> {
    let source = step.read_to_string()?;
    let path = step.input_path().to_string();
    step.add_javascript(&path, source);
    Ok(())
  }
}

/// Serves `.css` sources as stylesheets. Server-side stylesheets are ignored.
#[derive(Debug, Default)]
pub struct StylesheetHandler;

impl SourceHandler for StylesheetHandler {
  fn compile(&self, step: &mut CompileStep<'_>) -> Result<(), HandlerError> {
    if !is_browser(step.arch()) {
      return Ok(());
    }
    let source = step.read_to_string()?;
    let path = step.input_path().to_string();
    step.add_stylesheet(&path, source)
  }
}
