//! Property-based tests for rivulet-core topology and lifecycle invariants.
//!
//! Random resize sequences must keep both channel chains dense, keep the
//! recycling count equal to the number of owning channels, and keep SYNC and
//! ASYNC aliases pointing at the right input recyclings. Resizes mixed with
//! starting, ticking and removing ids must keep every id's container range on
//! its anchor's recyclings.

use proptest::prelude::*;
use rivulet_core::builtin::{Gain, RenderRecycling};
use rivulet_core::{
    AudioNode, Direction, GraphError, NodeFlags, RecallId, RecallKinds, RecallTemplate, Stage,
    Topology,
};

#[derive(Clone, Copy, Debug)]
enum Resize {
    AudioChannels(usize),
    Pads(Direction, usize),
}

fn resize_strategy() -> impl Strategy<Value = Resize> {
    prop_oneof![
        (0usize..5).prop_map(Resize::AudioChannels),
        (0usize..6).prop_map(|n| Resize::Pads(Direction::Input, n)),
        (0usize..6).prop_map(|n| Resize::Pads(Direction::Output, n)),
    ]
}

fn flags_strategy() -> impl Strategy<Value = NodeFlags> {
    (0usize..3, any::<bool>(), any::<bool>()).prop_map(|(link, input_own, output_own)| {
        let mut flags = match link {
            0 => NodeFlags::NONE,
            1 => NodeFlags::SYNC,
            _ => NodeFlags::ASYNC,
        };
        if input_own {
            flags |= NodeFlags::INPUT_HAS_OWN_RECYCLING;
        }
        if output_own {
            flags |= NodeFlags::OUTPUT_HAS_OWN_RECYCLING;
        }
        flags
    })
}

fn apply(node: &AudioNode, resize: Resize) {
    match resize {
        Resize::AudioChannels(n) => node.set_audio_channel_count(n).unwrap(),
        Resize::Pads(direction, n) => node.set_pad_count(direction, n).unwrap(),
    }
}

#[derive(Clone, Copy, Debug)]
enum Step {
    Resize(Resize),
    Start(usize),
    Tick,
    Remove,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => resize_strategy().prop_map(Step::Resize),
        2 => (0usize..16).prop_map(Step::Start),
        1 => Just(Step::Tick),
        1 => Just(Step::Remove),
    ]
}

fn try_apply(node: &AudioNode, resize: Resize) -> Result<(), GraphError> {
    match resize {
        Resize::AudioChannels(n) => node.set_audio_channel_count(n),
        Resize::Pads(direction, n) => node.set_pad_count(direction, n),
    }
}

fn start(node: &AudioNode, line: usize) -> RecallId {
    let root = node.tree().create_root();
    let id = node
        .add_recall_id(RecallKinds::PLAYBACK, root, Direction::Output, line)
        .unwrap();
    node.tree().release(root).unwrap();
    node.duplicate(id).unwrap();
    node.resolve(id).unwrap();
    for stage in Stage::ALL {
        node.init(stage, id).unwrap();
    }
    id
}

fn owning_channels(t: &Topology) -> usize {
    t.input.iter().chain(&t.output).filter(|c| c.owns_recycling).count()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// After any resize sequence, lines are `0..pads * audio_channels` and
    /// every line decomposes into its pad and audio channel.
    #[test]
    fn lines_stay_dense(
        flags in flags_strategy(),
        resizes in prop::collection::vec(resize_strategy(), 1..20),
    ) {
        let node = AudioNode::new("dense");
        node.set_flags(flags).unwrap();
        for resize in resizes {
            apply(&node, resize);
        }
        let t = node.topology().unwrap();
        for direction in Direction::BOTH {
            let channels = t.channels(direction);
            prop_assert_eq!(channels.len(), t.line_count(direction));
            for (i, c) in channels.iter().enumerate() {
                prop_assert_eq!(c.line, i);
                prop_assert_eq!(c.pad * t.audio_channels + c.audio_channel, i);
            }
        }
    }

    /// Every owning channel holds exactly one live recycling and nothing
    /// else does.
    #[test]
    fn recyclings_match_owning_channels(
        flags in flags_strategy(),
        resizes in prop::collection::vec(resize_strategy(), 1..20),
    ) {
        let node = AudioNode::new("owned");
        node.set_flags(flags).unwrap();
        for resize in resizes {
            apply(&node, resize);
        }
        let t = node.topology().unwrap();
        prop_assert_eq!(t.recycling_count(), owning_channels(&t));
        for r in &t.recyclings {
            let owner = t.channel(r.direction, r.line).unwrap();
            prop_assert_eq!(owner.id, r.owner);
            prop_assert_eq!(owner.first_recycling, Some(r.id));
        }
    }

    /// Growing then shrinking back restores the recycling count.
    #[test]
    fn grow_then_shrink_restores_count(
        audio_channels in 1usize..4,
        pads in 1usize..4,
        extra in 1usize..4,
    ) {
        let node = AudioNode::new("grow");
        node.set_flags(NodeFlags::INPUT_HAS_OWN_RECYCLING | NodeFlags::OUTPUT_HAS_OWN_RECYCLING)
            .unwrap();
        node.set_audio_channel_count(audio_channels).unwrap();
        node.set_pad_count(Direction::Input, pads).unwrap();
        node.set_pad_count(Direction::Output, pads).unwrap();
        let before = node.topology().unwrap();

        node.set_pad_count(Direction::Input, pads + extra).unwrap();
        node.set_audio_channel_count(audio_channels + extra).unwrap();
        node.set_audio_channel_count(audio_channels).unwrap();
        node.set_pad_count(Direction::Input, pads).unwrap();

        let after = node.topology().unwrap();
        prop_assert_eq!(after.recycling_count(), before.recycling_count());
        let ids = |t: &Topology| t.input.iter().map(|c| c.id).collect::<Vec<_>>();
        prop_assert_eq!(ids(&after), ids(&before));
    }

    /// SYNC outputs alias the input at the same line; ASYNC outputs span the
    /// first to last input pad of their column.
    #[test]
    fn aliases_follow_link_mode(
        sync in any::<bool>(),
        audio_channels in 1usize..4,
        input_pads in 1usize..5,
        output_pads in 1usize..5,
    ) {
        let link = if sync { NodeFlags::SYNC } else { NodeFlags::ASYNC };
        let node = AudioNode::new("alias");
        node.set_flags(link | NodeFlags::INPUT_HAS_OWN_RECYCLING).unwrap();
        node.set_audio_channel_count(audio_channels).unwrap();
        node.set_pad_count(Direction::Input, input_pads).unwrap();
        node.set_pad_count(Direction::Output, output_pads).unwrap();

        let t = node.topology().unwrap();
        for output in &t.output {
            prop_assert!(!output.owns_recycling);
            if sync {
                let input = t.channel(Direction::Input, output.line);
                let expected = input.and_then(|c| c.first_recycling);
                prop_assert_eq!(output.first_recycling, expected);
                prop_assert_eq!(output.last_recycling, expected);
            } else {
                let chain = t.recycling_chain(Direction::Input, output.audio_channel);
                prop_assert_eq!(output.first_recycling, chain.first().copied());
                prop_assert_eq!(output.last_recycling, chain.last().copied());
            }
        }
    }

    /// Repeated duplicate calls never create a second instance per template.
    #[test]
    fn duplicate_is_idempotent(repeats in 1usize..6, gains in 0usize..4) {
        let node = AudioNode::new("dup");
        node.set_flags(NodeFlags::SYNC | NodeFlags::INPUT_HAS_OWN_RECYCLING).unwrap();
        node.set_audio_channel_count(1).unwrap();
        node.set_pad_count(Direction::Input, 1).unwrap();
        node.set_pad_count(Direction::Output, 1).unwrap();
        node.add_recall_template(RecallTemplate::new(RenderRecycling)).unwrap();
        for i in 0..gains {
            node.add_recall_template(RecallTemplate::new(Gain::new(i as f32))).unwrap();
        }

        let root = node.tree().create_root();
        let id = node
            .add_recall_id(RecallKinds::PLAYBACK, root, Direction::Output, 0)
            .unwrap();
        let created: usize = (0..repeats).map(|_| node.duplicate(id).unwrap()).sum();
        prop_assert_eq!(created, gains + 1);
        prop_assert_eq!(node.instances(id).unwrap().len(), gains + 1);
    }

    /// Any mix of resizes and id lifecycles keeps each id's anchor alive and
    /// its container range on the anchor's current recyclings.
    #[test]
    fn lifecycles_survive_resizes(
        flags in flags_strategy(),
        steps in prop::collection::vec(step_strategy(), 1..30),
    ) {
        let node = AudioNode::new("mixed");
        node.set_flags(flags).unwrap();
        node.set_audio_channel_count(1).unwrap();
        node.set_pad_count(Direction::Input, 2).unwrap();
        node.set_pad_count(Direction::Output, 2).unwrap();
        node.add_recall_template(RecallTemplate::new(RenderRecycling)).unwrap();
        node.add_recall_template(RecallTemplate::new(Gain::new(0.5))).unwrap();

        let mut live: Vec<RecallId> = Vec::new();
        for step in steps {
            match step {
                Step::Resize(resize) => match try_apply(&node, resize) {
                    Ok(()) | Err(GraphError::LineInUse { .. }) => {}
                    Err(other) => prop_assert!(false, "unexpected {other}"),
                },
                Step::Start(line) => {
                    let lines = node.topology().unwrap().line_count(Direction::Output);
                    if lines > 0 {
                        live.push(start(&node, line % lines));
                    }
                }
                Step::Tick => {
                    for &id in &live {
                        node.tick(id).unwrap();
                    }
                }
                Step::Remove => {
                    if !live.is_empty() {
                        node.remove(live.remove(0)).unwrap();
                    }
                }
            }

            let t = node.topology().unwrap();
            for &id in &live {
                let state = node.recall_id_state(id).unwrap();
                let anchor = t.channels(state.anchor_direction).iter().find(|c| c.id == state.anchor);
                prop_assert!(anchor.is_some(), "{id} lost its anchor");
                let range = node.tree().range(state.container).unwrap();
                prop_assert_eq!(range, anchor.and_then(|c| c.recycling_span()));
            }
            prop_assert_eq!(node.is_playing().unwrap(), !live.is_empty());
        }

        for id in live {
            node.remove(id).unwrap();
        }
        prop_assert!(node.tree().is_empty());
        prop_assert!(!node.is_playing().unwrap());
    }
}
