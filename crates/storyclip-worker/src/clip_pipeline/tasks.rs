use std::path::{Path, PathBuf};
use std::time::Duration;

use storyclip_media::{FilterGraph, RenderRequest};
use storyclip_models::{clip_file_name, ClipWindow, JobId};

use crate::config::SupervisorConfig;

/// Where a job's scratch renders and published clips live.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    work_dir: PathBuf,
    output_dir: PathBuf,
    public_base_url: String,
}

impl OutputLayout {
    pub fn new(work_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            work_dir: work_dir.into(),
            output_dir: output_dir.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(&config.work_dir, &config.output_dir, &config.public_base_url)
    }

    /// Scratch directory owned by one job.
    pub fn job_work_dir(&self, job_id: &JobId) -> PathBuf {
        self.work_dir.join(job_id.as_str())
    }

    pub fn work_path(&self, job_id: &JobId, index: u32) -> PathBuf {
        self.job_work_dir(job_id).join(clip_file_name(index))
    }

    pub fn output_path(&self, job_id: &JobId, index: u32) -> PathBuf {
        self.output_dir.join(job_id.as_str()).join(clip_file_name(index))
    }

    pub fn public_url(&self, job_id: &JobId, index: u32) -> String {
        format!("{}/{}/{}", self.public_base_url, job_id, clip_file_name(index))
    }
}

/// One clip of a job, ready to hand to a renderer.
#[derive(Debug, Clone)]
pub struct RenderTask {
    pub job_id: JobId,
    /// Renders into the job's scratch directory
    pub request: RenderRequest,
    /// Published location once the render succeeds
    pub output_path: PathBuf,
    pub url: String,
}

impl RenderTask {
    pub fn index(&self) -> u32 {
        self.request.window.index
    }
}

/// Generate one render task per planned window.
///
/// The filter graph is built once per job and shared by every task.
pub fn generate_render_tasks(
    job_id: &JobId,
    source: &Path,
    windows: Vec<ClipWindow>,
    graph: &FilterGraph,
    layout: &OutputLayout,
    clip_timeout: Duration,
) -> Vec<RenderTask> {
    windows
        .into_iter()
        .map(|window| {
            let index = window.index;
            RenderTask {
                job_id: job_id.clone(),
                request: RenderRequest {
                    source: source.to_path_buf(),
                    destination: layout.work_path(job_id, index),
                    window,
                    graph: graph.clone(),
                    timeout: clip_timeout,
                },
                output_path: layout.output_path(job_id, index),
                url: layout.public_url(job_id, index),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyclip_media::FilterGraphBuilder;
    use storyclip_models::{ClipKind, EffectConfig};

    #[test]
    fn test_layout_paths() {
        let layout = OutputLayout::new("/work", "/out", "https://cdn.example.com/clips/");
        let id = JobId::from_string("job-7");

        assert_eq!(layout.work_path(&id, 3), PathBuf::from("/work/job-7/clip_003.mp4"));
        assert_eq!(layout.output_path(&id, 3), PathBuf::from("/out/job-7/clip_003.mp4"));
        assert_eq!(
            layout.public_url(&id, 3),
            "https://cdn.example.com/clips/job-7/clip_003.mp4"
        );
    }

    #[test]
    fn test_one_task_per_window() {
        let layout = OutputLayout::new("/work", "/out", "/outputs");
        let effects = EffectConfig::default();
        let graph = FilterGraphBuilder::build(&effects, effects.target_dimensions()).unwrap();
        let id = JobId::from_string("j");
        let windows = vec![
            ClipWindow::new(1, 0.0, 3.0, ClipKind::Standard),
            ClipWindow::new(2, 3.0, 3.0, ClipKind::Standard),
        ];

        let tasks = generate_render_tasks(
            &id,
            Path::new("/media/in.mp4"),
            windows,
            &graph,
            &layout,
            Duration::from_secs(30),
        );

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].index(), 2);
        assert_eq!(tasks[1].request.destination, PathBuf::from("/work/j/clip_002.mp4"));
        assert_eq!(tasks[1].url, "/outputs/j/clip_002.mp4");
        assert_eq!(tasks[0].request.graph, graph);
    }
}
