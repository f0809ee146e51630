// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A minimal [`AudioElementRenderer`] for the CLI: matches reconstructed
//! channel labels directly onto a target layout's channel order, filling
//! silence where a label the target wants was never reconstructed. Actual
//! spatial panning/down-mix-to-speakers math is out of scope for this
//! pipeline (`rendering_mix_presentation_finalizer.cc`'s own renderer
//! factories are a separate, unported concern) — this covers the common
//! case this CLI actually drives, an element whose layout already matches
//! its target.

use std::collections::HashMap;

use iamf_core::error::{invalid_argument, Result};
use iamf_obu::audio_element::LoudspeakerLayout;
use iamf_obu::channel_label::{base_channel_group_labels, ChannelLabel};
use iamf_obu::element::AudioElementWithData;
use iamf_obu::mix_presentation::{Layout, LayoutType};

use iamf_decode::finalizer::AudioElementRenderer;
use iamf_demux::demix::LabelSamples;

pub fn target_labels_for(layout: &Layout) -> Result<Vec<ChannelLabel>> {
    match layout.layout_type {
        LayoutType::Binaural => Ok(base_channel_group_labels(LoudspeakerLayout::Binaural)),
        LayoutType::LoudspeakersSsConventional => {
            let tag = layout
                .ss_layout_tag
                .ok_or(())
                .or_else(|_| invalid_argument("a conventional loudspeaker layout is missing its layout tag"))?;
            Ok(base_channel_group_labels(LoudspeakerLayout::from_tag(tag)?))
        }
        LayoutType::Reserved(tag) => invalid_argument(format!("cannot render to a reserved layout (tag {tag})")),
    }
}

pub struct MatchingLabelRenderer {
    target_labels: Vec<ChannelLabel>,
    pending: Vec<Vec<f64>>,
}

impl MatchingLabelRenderer {
    pub fn new(_with_data: &AudioElementWithData, layout: &Layout) -> Result<Self> {
        Ok(MatchingLabelRenderer { target_labels: target_labels_for(layout)?, pending: Vec::new() })
    }
}

impl AudioElementRenderer for MatchingLabelRenderer {
    fn render_labeled_frame(&mut self, samples: &LabelSamples, num_ticks: usize) -> Result<()> {
        let mut by_base: HashMap<&ChannelLabel, &Vec<f64>> = HashMap::new();
        for (label, values) in samples {
            by_base.entry(label.base()).or_insert(values);
        }

        let mut frame = vec![vec![0.0f64; self.target_labels.len()]; num_ticks];
        for (channel, label) in self.target_labels.iter().enumerate() {
            let Some(values) = by_base.get(label) else { continue };
            for (tick, row) in frame.iter_mut().enumerate() {
                if let Some(&sample) = values.get(tick) {
                    row[channel] = sample;
                }
            }
        }
        self.pending = frame;
        Ok(())
    }

    fn flush(&mut self) -> Result<Vec<Vec<f64>>> {
        Ok(std::mem::take(&mut self.pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iamf_obu::mix_presentation::LoudnessInfo;

    #[test]
    fn matches_available_labels_and_zero_fills_the_rest() {
        let layout = Layout { layout_type: LayoutType::LoudspeakersSsConventional, ss_layout_tag: Some(1), loudness: LoudnessInfo::default() };
        let mut renderer = MatchingLabelRenderer { target_labels: target_labels_for(&layout).unwrap(), pending: Vec::new() };

        let mut samples = LabelSamples::new();
        samples.insert(ChannelLabel::L2, vec![1.0, 0.5]);

        renderer.render_labeled_frame(&samples, 2).unwrap();
        let out = renderer.flush().unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0], vec![0.5, 0.0]]);
    }
}
