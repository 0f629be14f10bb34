//! Compile-command rendering.
//!
//! Turns flattened source records into concrete single-file compiler
//! invocations. Rendering is pure string work, parallelized across a
//! rayon pool sized by the job count.

use std::path::Path;

use anyhow::Result;
use rayon::prelude::*;

use crate::builder::fingerprint::command_fingerprint;
use crate::builder::with_pool;
use crate::core::{CompileCommand, SourceInfo};
use crate::util::config::CompilerPair;

/// Renders compile commands for flattened source records.
pub struct CommandSynthesizer {
    compilers: CompilerPair,
    bitcode: Option<CompilerPair>,
    output_dir: std::path::PathBuf,
}

impl CommandSynthesizer {
    pub fn new(compilers: CompilerPair, bitcode: Option<CompilerPair>, output_dir: &Path) -> Self {
        CommandSynthesizer {
            compilers,
            bitcode,
            output_dir: output_dir.to_path_buf(),
        }
    }

    /// Render one command per source file across all records.
    pub fn synthesize(
        &self,
        records: &[SourceInfo],
        jobs: Option<usize>,
    ) -> Result<Vec<CompileCommand>> {
        let units: Vec<(&SourceInfo, usize)> = records
            .iter()
            .flat_map(|record| (0..record.source_files.len()).map(move |i| (record, i)))
            .collect();

        for record in records {
            for index in record
                .custom_flags
                .keys()
                .chain(record.custom_definitions.keys())
            {
                if *index >= record.source_files.len() {
                    tracing::warn!(
                        "custom override for file index {index} ignored: record has {} file(s)",
                        record.source_files.len()
                    );
                }
            }
        }

        let commands: Vec<CompileCommand> = with_pool(jobs, || {
            units
                .par_iter()
                .map(|(record, index)| self.render(record, *index))
                .collect()
        })?;

        tracing::info!("synthesized {} compile command(s)", commands.len());
        Ok(commands)
    }

    fn render(&self, record: &SourceInfo, index: usize) -> CompileCommand {
        let file = &record.source_files[index];
        let empty: Vec<String> = Vec::new();
        let custom_flags = record.custom_flags.get(&index).unwrap_or(&empty);
        let custom_defs = record.custom_definitions.get(&index).unwrap_or(&empty);

        let custom_args: Vec<String> = custom_flags
            .iter()
            .chain(custom_defs.iter())
            .cloned()
            .collect();
        let fingerprint = command_fingerprint(
            file,
            &record.flags,
            &record.definitions,
            &record.includes,
            &custom_args,
        );

        let object = self.output_dir.join(format!("{fingerprint}.o"));
        let command = render_command(
            self.compilers.for_kind(record.compiler_kind),
            &[],
            record,
            custom_flags,
            custom_defs,
            file,
            &object,
        );
        let bitcode_command = self.bitcode.as_ref().map(|pair| {
            render_command(
                pair.for_kind(record.compiler_kind),
                &["-flto"],
                record,
                custom_flags,
                custom_defs,
                file,
                &self.output_dir.join(format!("{fingerprint}.bc")),
            )
        });

        CompileCommand {
            directory: record.exec_directory.clone(),
            file: file.clone(),
            command,
            fingerprint,
            bitcode_command,
        }
    }
}

/// Render the full invocation string with a fixed argument order.
fn render_command(
    compiler: &str,
    extra_flags: &[&str],
    record: &SourceInfo,
    custom_flags: &[String],
    custom_defs: &[String],
    file: &Path,
    object: &Path,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    parts.push(compiler.to_string());
    parts.extend(extra_flags.iter().map(|f| f.to_string()));
    parts.extend(record.flags.iter().cloned());
    parts.extend(
        record
            .definitions
            .iter()
            .map(|d| format!("-D{}", escape_definition(d))),
    );
    parts.extend(record.includes.iter().map(|i| format!("-I{i}")));
    parts.extend(custom_flags.iter().cloned());
    parts.extend(custom_defs.iter().map(|d| format!("-D{}", escape_definition(d))));
    parts.push("-c".to_string());
    parts.push(file.display().to_string());
    parts.push("-o".to_string());
    parts.push(object.display().to_string());
    parts.join(" ")
}

/// Escape a macro definition whose value is a quoted string literal.
///
/// `NAME=\"two words\"` keeps its embedded quotes and gets its inner
/// spaces backslash-escaped so the rendered command stays one shell
/// token. Anything else passes through unchanged; unbalanced quoting and
/// bare spaces cannot be made safe, so they are only warned about.
fn escape_definition(definition: &str) -> String {
    let parts: Vec<&str> = definition.split("\\\"").collect();
    if parts.len() == 3 {
        let middle = parts[1].replace(' ', "\\ ");
        format!("{}\\\"{}\\\"{}", parts[0], middle, parts[2])
    } else if parts.len() > 3 {
        tracing::warn!("definition has unbalanced quoting, passing through: {definition}");
        definition.to_string()
    } else {
        if definition.contains(' ') {
            tracing::warn!("definition contains unquoted whitespace: {definition}");
        }
        definition.to_string()
    }
}
