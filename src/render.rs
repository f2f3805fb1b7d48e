// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Rendering of the human-readable index.
//!
//! The template is read from disk on every call, rendered with tera against a
//! [`RenderSnapshot`], and the result replaces the destination file atomically.
//! The renderer keeps no state between calls.
//!
//! # Template context
//!
//! | Key                  | Value                                                  |
//! |----------------------|--------------------------------------------------------|
//! | `services`           | namespace → list of service records                    |
//! | `routes`             | namespace → list of ingress records                    |
//! | `namespaces`         | sorted list of `{ name, services, routes }`            |
//! | `default_route_host` | configured route host for namespaces without Ingress   |
//! | `generated_at`       | RFC 3339 timestamp of the snapshot                     |
//!
//! A service without a cluster IP renders with a null `address`; templates
//! should guard it with `{% if svc.address %}`.

use crate::errors::RenderError;
use crate::fs_util::write_atomic;
use crate::store::RenderSnapshot;
use std::path::{Path, PathBuf};
use tera::{Context, Tera};

const TEMPLATE_NAME: &str = "index";

/// Renders snapshots through a template file into a destination file.
#[derive(Clone, Debug)]
pub struct OutputRenderer {
    template_path: PathBuf,
    output_path: PathBuf,
    default_route_host: String,
}

impl OutputRenderer {
    #[must_use]
    pub fn new(template_path: PathBuf, output_path: PathBuf, default_route_host: String) -> Self {
        Self {
            template_path,
            output_path,
            default_route_host,
        }
    }

    #[must_use]
    pub fn default_route_host(&self) -> &str {
        &self.default_route_host
    }

    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Render `snapshot` and replace the destination file.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] if the template cannot be read, parsed or
    /// executed, or if the destination cannot be written.
    pub fn render(&self, snapshot: &RenderSnapshot) -> Result<(), RenderError> {
        render_to(snapshot, &self.template_path, &self.output_path)
    }
}

/// Render `snapshot` through the template at `template_path` into `destination`.
///
/// # Errors
///
/// Returns a [`RenderError`] if the template cannot be read, parsed or executed,
/// or if the destination cannot be written.
pub fn render_to(
    snapshot: &RenderSnapshot,
    template_path: &Path,
    destination: &Path,
) -> Result<(), RenderError> {
    let source =
        std::fs::read_to_string(template_path).map_err(|source| RenderError::TemplateUnreadable {
            path: template_path.to_path_buf(),
            source,
        })?;

    let rendered = render_str(snapshot, &source)?;

    write_atomic(destination, rendered.as_bytes()).map_err(|source| RenderError::Write {
        path: destination.to_path_buf(),
        source,
    })
}

/// Render `snapshot` through an in-memory template.
///
/// # Errors
///
/// Returns [`RenderError::Template`] if the template fails to parse or execute.
pub fn render_str(snapshot: &RenderSnapshot, template: &str) -> Result<String, RenderError> {
    let mut tera = Tera::default();
    tera.add_raw_template(TEMPLATE_NAME, template)?;
    Ok(tera.render(TEMPLATE_NAME, &template_context(snapshot)?)?)
}

fn template_context(snapshot: &RenderSnapshot) -> Result<Context, RenderError> {
    let mut context = Context::from_serialize(snapshot)?;
    context.insert("namespaces", &snapshot.namespaces());
    Ok(context)
}

#[cfg(test)]
#[path = "render_tests.rs"]
mod render_tests;
