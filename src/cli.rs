//! CLI: check | validate | shape | emit
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;
use serde_json::Value;

use json_sieve::{CompileOptions, Outcome, RegistryBuilder, SchemaDocument, UnknownKeys, ValidatorRegistry};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// compile OpenAPI / JSON-Schema documents into validators and run them against JSON data
#[derive(Parser, Debug)]
#[command(name = "json-sieve", version)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// compile schema documents and report diagnostics
    Check(CheckCmd),
    /// validate JSON instances against one named schema
    Validate(ValidateCmd),
    /// print the code-generator shape view
    Shape(ShapeCmd),
    /// print the canonical JSON Schema form of a document
    Emit(EmitCmd),
}

#[derive(Args, Debug, Clone)]
struct CompileSettings {
    /// JSON file with compile options (`maxDepth`, `unknownKeys`)
    #[arg(long)]
    config: Option<PathBuf>,

    /// maximum validation depth (overrides the config file)
    #[arg(long)]
    max_depth: Option<usize>,

    /// drop undeclared object keys from accepted values
    #[arg(long, default_value_t = false)]
    strip_unknown: bool,
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// treat input as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// JSON Pointer to select a subnode in each document (e.g. /data/items/0/payload)
    #[arg(long)]
    json_pointer: Option<String>,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct CheckCmd {
    /// schema documents (literal paths or quoted glob patterns)
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,

    #[command(flatten)]
    compile: CompileSettings,
}

#[derive(clap::Parser, Debug)]
struct ValidateCmd {
    /// schema document
    #[arg(long, short)]
    schema: PathBuf,

    /// schema name inside the document
    #[arg(long, short)]
    name: String,

    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    compile: CompileSettings,

    /// write a JSON report of every instance (stdout summary only if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct ShapeCmd {
    /// schema document
    #[arg(long, short)]
    schema: PathBuf,

    /// only this schema (all if omitted)
    #[arg(long, short)]
    name: Option<String>,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct EmitCmd {
    /// schema document
    #[arg(long, short)]
    schema: PathBuf,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

/// One JSON value read from an input file.
#[derive(Debug)]
struct Instance {
    source: String,
    value: Value,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl CompileSettings {
    fn load(&self) -> anyhow::Result<CompileOptions> {
        let mut options = match &self.config {
            Some(path) => {
                let src = read_source(path)?;
                CompileOptions::from_json_str(&src).with_context(|| format!("invalid config {}", path.display()))?
            }
            None => CompileOptions::default(),
        };
        if let Some(max_depth) = self.max_depth {
            options.max_depth = max_depth;
        }
        if self.strip_unknown {
            options.unknown_keys = UnknownKeys::Strip;
        }
        Ok(options)
    }
}

impl InputSettings {
    fn load(&self) -> anyhow::Result<Vec<Instance>> {
        let source_paths = resolve_file_path_patterns(&self.input)?;
        let mut out = Vec::new();
        for source_path in source_paths {
            let source_path_str = source_path.to_string_lossy().to_string();
            let source = read_source(&source_path)?;
            if self.ndjson {
                for (line_no, line) in source.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let label = format!("{source_path_str}:{}", line_no + 1);
                    let value = serde_json::from_str::<Value>(line)
                        .with_context(|| format!("failed to parse JSON ({label})"))?;
                    out.push(self.select(label, value)?);
                }
            } else {
                let value = serde_json::from_str::<Value>(&source)
                    .with_context(|| format!("failed to parse JSON source file ({source_path_str})"))?;
                out.push(self.select(source_path_str, value)?);
            }
        }
        Ok(out)
    }

    fn select(&self, source: String, value: Value) -> anyhow::Result<Instance> {
        let Some(pointer) = self.json_pointer.as_deref() else {
            return Ok(Instance { source, value });
        };
        match value.pointer(pointer) {
            Some(selected) => Ok(Instance { value: selected.clone(), source }),
            None => bail!("{source}: JSON pointer {pointer} selects nothing"),
        }
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> anyhow::Result<ExitCode> {
        match &self.cmd {
            Command::Check(target) => target.run(),
            Command::Validate(target) => target.run(),
            Command::Shape(target) => {
                let registry = build_registry(&target.schema, CompileOptions::default())?;
                let shapes = match &target.name {
                    Some(name) => serde_json::to_value(registry.shape(name)?)?,
                    None => {
                        let mut map = serde_json::Map::new();
                        for name in registry.names() {
                            map.insert(name.to_string(), serde_json::to_value(registry.shape(name)?)?);
                        }
                        Value::Object(map)
                    }
                };
                write_output(target.out.as_deref(), &serde_json::to_string_pretty(&shapes)?)?;
                Ok(ExitCode::SUCCESS)
            }
            Command::Emit(target) => {
                let document = load_document(&target.schema)?;
                let emitted = json_sieve::emit::document(&document);
                write_output(target.out.as_deref(), &serde_json::to_string_pretty(&emitted)?)?;
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

impl CheckCmd {
    fn run(&self) -> anyhow::Result<ExitCode> {
        let options = self.compile.load()?;
        let mut failed = false;
        for path in resolve_file_path_patterns(&self.input)? {
            let label = path.display().to_string();
            let result = load_document(&path).and_then(|document| {
                RegistryBuilder::new().options(options.clone()).build(&document).map_err(anyhow::Error::from)
            });
            match result {
                Ok(registry) => {
                    println!("{} {label} ({} schemas)", "ok".green().bold(), registry.len());
                    for diagnostic in registry.diagnostics() {
                        println!("  {} {diagnostic}", "warning:".yellow());
                    }
                }
                Err(error) => {
                    failed = true;
                    println!("{} {label}: {error:#}", "error".red().bold());
                }
            }
        }
        Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
    }
}

impl ValidateCmd {
    fn run(&self) -> anyhow::Result<ExitCode> {
        let registry = build_registry(&self.schema, self.compile.load()?)?;
        let validator = registry.get(&self.name)?;
        let instances = self.input_settings.load()?;

        let outcomes: Vec<(&Instance, Outcome)> = instances
            .par_iter()
            .map(|instance| (instance, validator.validate(&instance.value)))
            .collect();

        let mut rejected = 0usize;
        for (instance, outcome) in &outcomes {
            match outcome {
                Outcome::Accepted(_) => println!("{} {}", "✔".green(), instance.source),
                Outcome::Rejected(issues) => {
                    rejected += 1;
                    println!("{} {}", "✘".red(), instance.source);
                    for issue in issues {
                        println!("    {issue}");
                    }
                }
            }
        }
        eprintln!("{} of {} instances valid", outcomes.len() - rejected, outcomes.len());

        if let Some(out) = self.out.as_deref() {
            let report: Vec<Value> = outcomes
                .iter()
                .map(|(instance, outcome)| {
                    let mut entry = outcome.report();
                    entry["source"] = Value::from(instance.source.clone());
                    entry
                })
                .collect();
            write_output(Some(out), &serde_json::to_string_pretty(&report)?)?;
        }
        Ok(if rejected == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn read_source(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn load_document(path: &Path) -> anyhow::Result<SchemaDocument> {
    let src = read_source(path)?;
    SchemaDocument::from_json_str(&src).with_context(|| format!("failed to load schema document {}", path.display()))
}

fn build_registry(path: &Path, options: CompileOptions) -> anyhow::Result<ValidatorRegistry> {
    let document = load_document(path)?;
    RegistryBuilder::new()
        .options(options)
        .build(&document)
        .with_context(|| format!("failed to compile {}", path.display()))
}

fn write_output(out: Option<&Path>, text: &str) -> anyhow::Result<()> {
    match out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(out, text).with_context(|| format!("failed to write {}", out.display()))
        }
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

fn resolve_file_path_patterns<I>(patterns: I) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
