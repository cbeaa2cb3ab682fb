use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use crate::config::pipeline::ShaderRef;

pub const DEFAULT_COMPILER: &str = "glslc";

/// True when `output` is missing or older than `source`
pub fn needs_build(source: &Path, output: &Path) -> Result<bool> {
    let Ok(output_meta) = std::fs::metadata(output) else {
        return Ok(true);
    };
    let source_modified = std::fs::metadata(source)
        .and_then(|meta| meta.modified())
        .wrap_err_with(|| format!("Cannot stat shader source {}", source.display()))?;
    Ok(output_meta.modified()? < source_modified)
}

/// Compiles GLSL sources into `<shader_dir>/spv/<name>.<ext>.spv` with an external compiler
pub struct ShaderBuilder {
    compiler: String,
    shader_dir: PathBuf,
}

impl ShaderBuilder {
    pub fn new(shader_dir: &Path) -> Self {
        Self {
            compiler: DEFAULT_COMPILER.to_string(),
            shader_dir: shader_dir.to_path_buf(),
        }
    }

    pub fn with_compiler(mut self, compiler: &str) -> Self {
        self.compiler = compiler.to_string();
        self
    }

    /// Returns the binary path; prebuilt binaries without a source are used as they are
    pub fn build(&self, shader: &ShaderRef) -> Result<PathBuf> {
        let source = shader.source_path(&self.shader_dir);
        let output = shader.binary_path(&self.shader_dir);

        if !source.exists() {
            if !output.exists() {
                bail!("Shader {} has neither {} nor {}", shader.id, source.display(), output.display());
            }
            log::debug!("Using prebuilt {}", output.display());
            return Ok(output);
        }
        if !needs_build(&source, &output)? {
            log::trace!("{} is up to date", output.display());
            return Ok(output);
        }

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("Cannot create {}", parent.display()))?;
        }
        log::info!("Compiling {} -> {}", source.display(), output.display());
        let result = Command::new(&self.compiler)
            .arg(&source)
            .arg("-o")
            .arg(&output)
            .output()
            .wrap_err_with(|| format!("Failed to run {}", self.compiler))?;
        if !result.status.success() {
            bail!(
                "{} failed for {} ({}): {}",
                self.compiler,
                source.display(),
                result.status,
                String::from_utf8_lossy(&result.stderr).trim(),
            );
        }
        Ok(output)
    }

    /// Builds each distinct shader id once
    pub fn build_all<'a, I>(&self, shader_ids: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let unique: BTreeSet<&String> = shader_ids.into_iter().collect();
        for id in unique {
            self.build(&ShaderRef::parse(id)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::time::{Duration, SystemTime};

    fn touch(path: &Path, modified: SystemTime) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let file = File::create(path).unwrap();
        file.set_modified(modified).unwrap();
    }

    #[test]
    fn missing_or_stale_output_needs_build() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("Cells.vert");
        let output = dir.path().join("spv/Cells.vert.spv");
        let now = SystemTime::now();

        touch(&source, now);
        assert!(needs_build(&source, &output).unwrap());

        touch(&output, now - Duration::from_secs(60));
        assert!(needs_build(&source, &output).unwrap());

        touch(&output, now + Duration::from_secs(60));
        assert!(!needs_build(&source, &output).unwrap());
    }

    #[test]
    fn up_to_date_binary_skips_the_compiler() {
        let dir = tempfile::tempdir().unwrap();
        let shader = ShaderRef::parse("EngineComp").unwrap();
        let now = SystemTime::now();
        touch(&shader.source_path(dir.path()), now);
        touch(&shader.binary_path(dir.path()), now + Duration::from_secs(5));

        let builder = ShaderBuilder::new(dir.path()).with_compiler("compiler-that-does-not-exist");
        assert_eq!(builder.build(&shader).unwrap(), dir.path().join("spv/Engine.comp.spv"));
    }

    #[test]
    fn stale_binary_invokes_the_compiler() {
        let dir = tempfile::tempdir().unwrap();
        let shader = ShaderRef::parse("EngineComp").unwrap();
        touch(&shader.source_path(dir.path()), SystemTime::now());

        let builder = ShaderBuilder::new(dir.path()).with_compiler("compiler-that-does-not-exist");
        let err = builder.build(&shader).unwrap_err();
        assert!(format!("{err:#}").contains("compiler-that-does-not-exist"));
    }

    #[test]
    fn prebuilt_binary_without_source_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let shader = ShaderRef::parse("SkyFrag").unwrap();
        let builder = ShaderBuilder::new(dir.path());
        assert!(builder.build(&shader).is_err());

        touch(&shader.binary_path(dir.path()), SystemTime::now());
        assert!(builder.build(&shader).is_ok());
    }
}
