//! Typed page templates.
//!
//! A [`Template`] pairs embedded page text with the one variable set that
//! fills it. `overlay::OverlayVars` is that set for `overlay.html`: its
//! [`TemplateVars::apply`] swaps each `__NAME__` placeholder for escaped card
//! data or overlay config, and `overlay::render` builds one per request for
//! the plain or webcam page.

use std::marker::PhantomData;

/// Placeholder substitutions for one page.
pub trait TemplateVars {
    fn apply(&self, content: &str) -> String;
}

/// Embedded page text that only `V` can render.
#[derive(Debug, Clone, Copy)]
pub struct Template<V> {
    content: &'static str,
    _marker: PhantomData<V>,
}

impl<V> Template<V> {
    pub const fn new(content: &'static str) -> Self {
        Self {
            content,
            _marker: PhantomData,
        }
    }

    /// Raw text with placeholders intact.
    pub const fn content(&self) -> &'static str {
        self.content
    }
}

impl<V: TemplateVars> Template<V> {
    pub fn render(&self, vars: &V) -> String {
        vars.apply(self.content)
    }
}
