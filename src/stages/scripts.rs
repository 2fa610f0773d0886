// src/stages/scripts.rs

//! Bash job scripts with `#SBATCH` headers.
//!
//! Every script removes its stage's locks on exit, writes to a temporary
//! output that is moved into place on success, and touches the stage's done
//! markers as its last step.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::batch::Batch;
use crate::config::model::SchedulerSection;
use crate::config::RunConfig;
use crate::run::RunDescriptor;

/// Quote `s` for safe use as one bash word.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:@,".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn q(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

fn bash_array(paths: &[PathBuf]) -> String {
    paths.iter().map(|p| q(p)).collect::<Vec<_>>().join(" ")
}

/// Header fields common to every job.
#[derive(Debug, Clone)]
pub struct JobHeader<'a> {
    pub account: Option<&'a str>,
    pub walltime: &'a str,
    pub cpus: u32,
    pub mem: &'a str,
    pub partition: Option<&'a str>,
    pub gres: Option<&'a str>,
    pub mail_type: &'a str,
    pub mail_users: &'a [String],
    /// Stdout/stderr file; `%j` expands to the job id.
    pub output: String,
    pub job_name: String,
}

pub fn render_header(header: &JobHeader<'_>) -> String {
    let mut out = String::from("#!/bin/bash\n");
    let mut line = |key: &str, value: &str| {
        let _ = writeln!(out, "#SBATCH --{key:<16}{value}");
    };

    if let Some(account) = header.account {
        line("account", account);
    }
    line("time", header.walltime);
    line("cpus-per-task", &header.cpus.to_string());
    line("mem", header.mem);
    if let Some(partition) = header.partition {
        line("partition", partition);
    }
    if let Some(gres) = header.gres {
        line("gres", gres);
    }
    if !header.mail_users.is_empty() {
        line("mail-type", header.mail_type);
        line("mail-user", &header.mail_users.join(","));
    }
    line("output", &header.output);
    line("job-name", &header.job_name);
    out.push('\n');
    out
}

/// Script for one basecalling batch.
pub fn basecalling_script(
    batch: &Batch,
    run_config: &RunConfig,
    sched: &SchedulerSection,
    account: Option<&str>,
    mail_users: &[String],
) -> String {
    let header = JobHeader {
        account,
        walltime: &sched.basecalling_walltime,
        cpus: sched.basecalling_cpus,
        mem: &sched.basecalling_mem,
        partition: Some(&sched.gpu_partition),
        gres: Some(&sched.gpu_gres),
        mail_type: "FAIL",
        mail_users,
        output: format!("{}.%j.out", batch.script_file().display()),
        job_name: format!("eldorado-basecalling-{}", batch.id),
    };

    let mods = run_config.modification_models_arg();
    let mods_arg = if mods.is_empty() {
        String::new()
    } else {
        format!("--modified-bases-models {} ", shell_quote(&mods))
    };

    let mut s = render_header(&header);
    let _ = write!(
        s,
        r#"set -eu

LOCK_FILES=({locks})
trap 'rm -f "${{LOCK_FILES[@]}}"' EXIT

START=$(date '+%Y-%m-%d %H:%M:%S')
START_S=$(date '+%s')

OUTDIR={outdir}
mkdir -p "$OUTDIR"
TEMP_BAM="$OUTDIR/tmp.bam.$SLURM_JOB_ID"

POD5_DIR="$OUTDIR/pod5"
mkdir -p "$POD5_DIR"
POD5_FILES=({pod5s})
for POD5_FILE in "${{POD5_FILES[@]}}"; do
    ln -sf "$POD5_FILE" "$POD5_DIR"
done

{dorado} basecaller --no-trim {mods_arg}{model} "$POD5_DIR" > "$TEMP_BAM"
mv "$TEMP_BAM" {bam}

END=$(date '+%Y-%m-%d %H:%M:%S')
END_S=$(date '+%s')

LOG_FILE={log}
{{
    echo "slurm_job_id=$SLURM_JOB_ID"
    echo "pod5_size=$(du -sL "$POD5_DIR" | cut -f1)"
    echo "pod5_file_count={count}"
    echo "output_bam={bam_plain}"
    echo "output_bam_size=$(du -sL {bam} | cut -f1)"
    echo "bam_read_count=$(samtools view -c {bam})"
    echo "start=$START"
    echo "end=$END"
    echo "runtime=$((END_S-START_S))"
    echo "basecaller={dorado_plain}"
    echo "basecalling_model={model_plain}"
    echo "modified_bases_models={mods}"
}} >> "$LOG_FILE"

DONE_FILES=({dones})
for DONE_FILE in "${{DONE_FILES[@]}}"; do
    mkdir -p "$(dirname "$DONE_FILE")"
    touch "$DONE_FILE"
done
touch {batch_done}
"#,
        locks = bash_array(&batch.lock_files),
        outdir = q(&batch.working_dir),
        pod5s = bash_array(&batch.files),
        dorado = q(&run_config.dorado_executable),
        model = q(&run_config.basecalling_model),
        bam = q(&batch.output_bam()),
        bam_plain = batch.output_bam().display(),
        log = q(&batch.log_file()),
        count = batch.files.len(),
        dorado_plain = run_config.dorado_executable.display(),
        model_plain = run_config.basecalling_model.display(),
        dones = bash_array(&batch.done_files),
        batch_done = q(&batch.done_file()),
    );
    s
}

/// Script merging all batch bams of a run into `merged.bam`.
pub fn merging_script(
    run: &RunDescriptor,
    bams: &[PathBuf],
    sched: &SchedulerSection,
    account: Option<&str>,
    mail_users: &[String],
) -> String {
    let header = JobHeader {
        account,
        walltime: &sched.merging_walltime,
        cpus: sched.merging_cpus,
        mem: &sched.merging_mem,
        partition: None,
        gres: None,
        mail_type: "FAIL",
        mail_users,
        output: format!("{}.%j.out", run.merge_script().display()),
        job_name: "eldorado-merging".to_string(),
    };

    let mut s = render_header(&header);
    let _ = write!(
        s,
        r#"set -eu

OUTPUT_BAM={merged}
TEMP_BAM=$(mktemp "$OUTPUT_BAM.tmp.XXXXXXXX")
trap 'rm -f {lock} "$TEMP_BAM"' EXIT

BAM_FILES=({bams})
samtools merge -f --threads {cpus} -o "$TEMP_BAM" "${{BAM_FILES[@]}}"
mv "$TEMP_BAM" "$OUTPUT_BAM"

touch {done}
"#,
        merged = q(&run.merged_bam()),
        lock = q(&run.merge_lock()),
        bams = bash_array(bams),
        cpus = sched.merging_cpus,
        done = q(&run.merge_done()),
    );
    s
}

/// Script demultiplexing `merged.bam` into one bam per barcode.
pub fn demultiplexing_script(
    run: &RunDescriptor,
    run_config: &RunConfig,
    sample_sheet: &Path,
    kit: &str,
    sched: &SchedulerSection,
    account: Option<&str>,
    mail_users: &[String],
) -> String {
    let header = JobHeader {
        account,
        walltime: &sched.demux_walltime,
        cpus: sched.demux_cpus,
        mem: &sched.demux_mem,
        partition: None,
        gres: None,
        mail_type: "FAIL,END",
        mail_users,
        output: format!("{}.%j.out", run.demux_script().display()),
        job_name: "eldorado-demux".to_string(),
    };

    let mut s = render_header(&header);
    let _ = write!(
        s,
        r#"set -eu

TEMP_DIR=$(mktemp -d {demux_dir}/tmp.XXXXXXXX)
trap 'rm -rf {lock} "$TEMP_DIR"' EXIT

{dorado} demux \
    --no-trim \
    --sample-sheet {sheet} \
    --kit-name {kit} \
    --threads {cpus} \
    --output-dir "$TEMP_DIR" \
    {merged}

mv "$TEMP_DIR"/*.bam {output_dir}

touch {done}
"#,
        demux_dir = q(run.demux_dir()),
        lock = q(&run.demux_lock()),
        dorado = q(&run_config.dorado_executable),
        sheet = q(sample_sheet),
        kit = shell_quote(kit),
        cpus = sched.demux_cpus,
        merged = q(&run.merged_bam()),
        output_dir = q(run.output_dir()),
        done = q(&run.demux_done()),
    );
    s
}
