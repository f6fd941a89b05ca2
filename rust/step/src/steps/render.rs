use async_trait::async_trait;
use indexmap::IndexMap;

use kubexm_context::StepContext;
use kubexm_host::Host;
use kubexm_runner::Command;

use crate::{Step, StepError, StepMeta, StepOutput, StepResult};

/// Expand `${key}` placeholders in a template.
///
/// # Errors
///
/// Returns [`StepError::Template`] naming the first placeholder with no
/// value.
pub fn expand(template: &str, vars: &IndexMap<String, String>) -> StepResult<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        rendered.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(StepError::Template {
                placeholder: after.to_string(),
            });
        };
        let key = &after[..end];
        let value = vars.get(key).ok_or_else(|| StepError::Template {
            placeholder: key.to_string(),
        })?;
        rendered.push_str(value);
        rest = &after[end + 1..];
    }
    rendered.push_str(rest);
    Ok(rendered)
}

/// Render a template and place the result on the target host.
///
/// Static variables are baked in at plan time; cache variables are
/// resolved at run time so a template can consume artifacts produced
/// by earlier steps (tokens, membership strings).
#[derive(Debug, Clone)]
pub struct RenderStep {
    name: String,
    template: String,
    vars: IndexMap<String, String>,
    cache_vars: Vec<String>,
    remote_path: String,
    mode: Option<u32>,
}

impl RenderStep {
    /// Render the template to a remote path.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        template: impl Into<String>,
        remote_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            vars: IndexMap::new(),
            cache_vars: Vec::new(),
            remote_path: remote_path.into(),
            mode: None,
        }
    }

    /// Bake in a static variable.
    #[must_use]
    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Resolve a placeholder from the cache at run time; the cache key
    /// is the placeholder name.
    #[must_use]
    pub fn cache_var(mut self, key: impl Into<String>) -> Self {
        self.cache_vars.push(key.into());
        self
    }

    /// Set the file mode after upload, e.g. `0o644`.
    #[must_use]
    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }
}

#[async_trait]
impl Step for RenderStep {
    fn meta(&self) -> StepMeta {
        StepMeta::new(&self.name, format!("render {}", self.remote_path))
    }

    async fn run(&self, ctx: &StepContext, host: &Host) -> StepResult<StepOutput> {
        if ctx.cancel().is_cancelled() {
            return Err(StepError::Cancelled);
        }

        let mut vars = self.vars.clone();
        for key in &self.cache_vars {
            let value = ctx
                .cache()
                .get_string(key)
                .ok_or_else(|| StepError::MissingCacheKey { key: key.clone() })?;
            vars.insert(key.clone(), value);
        }

        let rendered = expand(&self.template, &vars)?;
        ctx.runner()
            .upload(host, rendered.as_bytes(), &self.remote_path)
            .await?;

        if let Some(mode) = self.mode {
            ctx.runner()
                .exec_checked(
                    host,
                    &Command::new(format!("chmod {mode:o} {}", self.remote_path)),
                )
                .await?;
        }

        Ok(StepOutput::message(format!(
            "rendered {}",
            self.remote_path
        )))
    }

    async fn rollback(&self, ctx: &StepContext, host: &Host) -> StepResult<()> {
        ctx.runner()
            .exec(host, &Command::new(format!("rm -f {}", self.remote_path)))
            .await?;
        Ok(())
    }
}
