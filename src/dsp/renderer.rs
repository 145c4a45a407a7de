//! Offline renderer — runs the effect graph against a virtual clock.
//!
//! Builds the same topology the live player uses, sized to the source's
//! channel layout and sample rate, starts the source at zero and pulls
//! quanta until the requested length is filled.

use std::rc::Rc;

use crate::buffer::AudioBuffer;
use crate::context::{AudioContext, RENDER_QUANTUM};
use crate::error::{PlayerError, Result};
use crate::params::{EffectParams, RenderOptions};

use super::graph::{Graph, Topology};
use super::wav;

/// Render `source` through the effect chain with a static snapshot of
/// `params`, snapped and clamped to the slider ranges first. Fails with
/// `NoSourceLoaded` when there is nothing to render.
pub fn render(
    source: Option<&Rc<AudioBuffer>>,
    params: &EffectParams,
    options: &RenderOptions,
) -> Result<AudioBuffer> {
    let source = source.ok_or(PlayerError::NoSourceLoaded)?;
    render_graph(source, &params.normalized(), options).map_err(|e| match e {
        PlayerError::RenderFailure(_) => e,
        other => PlayerError::RenderFailure(other.to_string()),
    })
}

fn render_graph(source: &Rc<AudioBuffer>, params: &EffectParams, options: &RenderOptions) -> Result<AudioBuffer> {
    let sample_rate = source.sample_rate();
    let channels = source.channel_count();
    let frames = options.output_frames(source.len(), params.speed);

    log::info!(
        "offline render: {frames} frames, {channels} ch @ {sample_rate} Hz, {params:?}"
    );

    let context = AudioContext::offline(sample_rate)?;
    let topology = Topology::from_params(params);
    let mut graph = Graph::materialize(&topology, Rc::clone(source), &context)?;
    graph.start(0.0)?;

    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(frames); channels];
    let mut block = vec![vec![0.0; RENDER_QUANTUM]; channels];
    let mut rendered = 0;
    while rendered < frames {
        graph.process_quantum(&mut block);
        let take = (frames - rendered).min(RENDER_QUANTUM);
        for (out, ch) in output.iter_mut().zip(&block) {
            out.extend_from_slice(&ch[..take]);
        }
        rendered += take;
    }
    context.close();

    log::debug!("offline render finished at {:.3}s virtual time", context.current_time());
    AudioBuffer::from_channels(output, sample_rate)
}

/// Render and encode in one step: the bytes of the downloadable WAV file.
pub fn render_wav(
    source: Option<&Rc<AudioBuffer>>,
    params: &EffectParams,
    options: &RenderOptions,
) -> Result<Vec<u8>> {
    let rendered = render(source, params, options)?;
    wav::encode(&rendered)
}
