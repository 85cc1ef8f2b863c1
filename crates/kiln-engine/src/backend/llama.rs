//! llama.cpp adapter.
//!
//! Drives the llama.cpp command-line tools as subprocesses: `llama-cli` for
//! text, `llama-mtmd-cli` for vision, `llama-embedding` for embeddings. The
//! model file is shared by every worker; each context carries only its
//! resolved tool paths and generation knobs, so per-worker isolation is
//! trivial and all heavyweight state stays inside the child process.

use std::path::{Path, PathBuf};
use std::process::Command;

use kiln_core::config::EngineSettings;

use super::{vision_gate, Backend, BackendError, Context};

const TEXT_TOOL: &str = "llama-cli";
const VISION_TOOL: &str = "llama-mtmd-cli";
const EMBED_TOOL: &str = "llama-embedding";

/// Backend factory bound to one model file (and optionally an mmproj file
/// for vision jobs).
pub struct LlamaBackend {
    model: PathBuf,
    mmproj: Option<PathBuf>,
    settings: EngineSettings,
}

impl LlamaBackend {
    pub fn new(
        model: impl Into<PathBuf>,
        mmproj: Option<PathBuf>,
        settings: EngineSettings,
    ) -> Result<Self, BackendError> {
        let model = model.into();
        if !model.is_file() {
            return Err(BackendError::Model(format!(
                "model file not found: {}",
                model.display()
            )));
        }
        if let Some(p) = &mmproj {
            if !p.is_file() {
                return Err(BackendError::Model(format!(
                    "mmproj file not found: {}",
                    p.display()
                )));
            }
        }
        Ok(Self {
            model,
            mmproj,
            settings,
        })
    }

    fn tool_path(&self, name: &str) -> PathBuf {
        if self.settings.bin_dir.as_os_str().is_empty() {
            PathBuf::from(name)
        } else {
            self.settings.bin_dir.join(name)
        }
    }
}

impl Backend for LlamaBackend {
    fn create_context(&self, worker_id: usize) -> Result<Box<dyn Context>, BackendError> {
        tracing::debug!(worker_id, model = %self.model.display(), "creating inference context");
        Ok(Box::new(LlamaContext {
            model: self.model.clone(),
            mmproj: self.mmproj.clone(),
            text_tool: self.tool_path(TEXT_TOOL),
            vision_tool: self.tool_path(VISION_TOOL),
            embed_tool: self.tool_path(EMBED_TOOL),
            settings: self.settings.clone(),
        }))
    }
}

struct LlamaContext {
    model: PathBuf,
    mmproj: Option<PathBuf>,
    text_tool: PathBuf,
    vision_tool: PathBuf,
    embed_tool: PathBuf,
    settings: EngineSettings,
}

impl LlamaContext {
    fn sampling_args(&self, cmd: &mut Command, temperature: f32) {
        let s = &self.settings;
        cmd.args(["--temp", &temperature.to_string()])
            .args(["--top-k", &s.top_k.to_string()])
            .args(["--top-p", &s.top_p.to_string()])
            .args(["--min-p", &s.min_p.to_string()])
            .args(["--repeat-penalty", &s.repeat_penalty.to_string()])
            .args(["-c", &s.max_ctx.to_string()])
            .args(["-n", &s.n_predict.to_string()])
            .args(["-ngl", &s.gpu_layers.to_string()]);
        if s.seed != 0 {
            cmd.args(["-s", &s.seed.to_string()]);
        }
    }

    fn run_tool(&self, mut cmd: Command) -> Result<String, BackendError> {
        let tool = Path::new(cmd.get_program())
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "llama".to_string());

        let output = cmd
            .output()
            .map_err(|source| BackendError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = last_lines(&stderr, 4);
            return Err(BackendError::Tool {
                tool,
                status: output.status.code().unwrap_or(-1),
                stderr: detail,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Context for LlamaContext {
    fn run_text(&mut self, prompt: &str) -> Result<String, BackendError> {
        let mut cmd = Command::new(&self.text_tool);
        cmd.arg("-m")
            .arg(&self.model)
            .args(["-p", prompt])
            .args(["--no-display-prompt", "--simple-io", "-no-cnv"]);
        self.sampling_args(&mut cmd, self.settings.temperature);

        let raw = self.run_tool(cmd)?;
        Ok(strip_think_blocks(&raw))
    }

    fn run_vision(&mut self, prompt: &str, images: &[PathBuf]) -> Result<String, BackendError> {
        if images.is_empty() {
            return self.run_text(prompt);
        }
        let mmproj = self.mmproj.as_ref().ok_or_else(|| {
            BackendError::Model("vision job requires --mmproj".to_string())
        })?;

        let mut cmd = Command::new(&self.vision_tool);
        cmd.arg("-m")
            .arg(&self.model)
            .arg("--mmproj")
            .arg(mmproj)
            .args(["-p", prompt]);
        for image in images {
            cmd.arg("--image").arg(image);
        }
        // Vision jobs run colder for more literal image descriptions.
        self.sampling_args(&mut cmd, self.settings.vision_temperature);

        // Vision encoding shares compute-graph state across contexts;
        // serialize the whole call.
        let raw = {
            let _gate = vision_gate();
            self.run_tool(cmd)?
        };
        Ok(strip_think_blocks(&raw))
    }

    fn embed(&mut self, text: &str) -> Result<Vec<f32>, BackendError> {
        let mut cmd = Command::new(&self.embed_tool);
        cmd.arg("-m")
            .arg(&self.model)
            .args(["-p", text])
            .args(["--pooling", "mean"])
            .args(["-c", &self.settings.max_ctx.to_string()]);

        let raw = self.run_tool(cmd)?;
        let vector: Vec<f32> = raw
            .split_whitespace()
            .filter_map(|tok| tok.parse().ok())
            .collect();
        if vector.is_empty() {
            return Err(BackendError::InvalidOutput(
                "embedding tool produced no vector".to_string(),
            ));
        }
        Ok(vector)
    }
}

/// Drop `<think>...</think>` blocks emitted by reasoning models, then trim
/// the leading whitespace they leave behind.
fn strip_think_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        match rest.find("<think>") {
            Some(start) => {
                out.push_str(&rest[..start]);
                match rest[start..].find("</think>") {
                    Some(end) => rest = &rest[start + end + "</think>".len()..],
                    None => break, // unterminated block: drop the tail
                }
            }
            None => {
                out.push_str(rest);
                break;
            }
        }
    }
    out.trim_start().to_string()
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_think_removes_block_and_leading_space() {
        let text = "<think>chain of thought</think>\n  answer";
        assert_eq!(strip_think_blocks(text), "answer");
    }

    #[test]
    fn strip_think_handles_multiple_blocks() {
        let text = "<think>a</think>one<think>b</think> two";
        assert_eq!(strip_think_blocks(text), "one two");
    }

    #[test]
    fn strip_think_passes_plain_text_through() {
        assert_eq!(strip_think_blocks("plain answer"), "plain answer");
    }

    #[test]
    fn strip_think_drops_unterminated_tail() {
        assert_eq!(strip_think_blocks("ok<think>never closed"), "ok");
    }

    #[test]
    fn last_lines_keeps_the_tail() {
        let text = "a\n\nb\nc\nd\ne";
        assert_eq!(last_lines(text, 2), "d\ne");
        assert_eq!(last_lines("x", 4), "x");
    }

    #[test]
    fn missing_model_is_rejected() {
        let err = LlamaBackend::new("/nonexistent/model.gguf", None, EngineSettings::default())
            .err()
            .expect("missing model must fail");
        assert!(matches!(err, BackendError::Model(_)));
    }
}
