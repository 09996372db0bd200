//! The synthesis entry point: enumerate or fill, then evaluate under side-effect tracking.

use nova_synth_bridge::{ExecutionBridge, FrameInfo, Type, Value};
use nova_synth_config::SynthConfig;
use nova_synth_syntax::Skeleton;

use crate::constraint::TypeConstraint;
use crate::effects::{redo_effects, Effect, SideEffectHandler};
use crate::eval::EvaluationManager;
use crate::expr::{ExprArena, ExprId};
use crate::filler::SkeletonFiller;
use crate::generator::ExpressionGenerator;
use crate::property::Property;
use crate::types::TypeStore;
use crate::{CancellationToken, CandidateOutcome, SynthResult};

/// One synthesis request.
#[derive(Debug)]
pub struct SynthesisRequest {
    pub property: Box<dyn Property>,
    /// Template with `??`/`**` holes; the whole search space when absent.
    pub skeleton: Option<String>,
    /// Declared type of the variable being assigned, if any.
    pub static_type: Option<Type>,
    /// Overrides `search.max_depth`.
    pub max_depth: Option<u32>,
    pub cancel: CancellationToken,
}

impl SynthesisRequest {
    pub fn new(property: impl Property + 'static) -> Self {
        Self {
            property: Box::new(property),
            skeleton: None,
            static_type: None,
            max_depth: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn skeleton(mut self, skeleton: impl Into<String>) -> Self {
        self.skeleton = Some(skeleton.into());
        self
    }

    pub fn static_type(mut self, ty: Type) -> Self {
        self.static_type = Some(ty);
        self
    }

    pub fn max_depth(mut self, depth: u32) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// An accepted candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesized {
    pub expression: String,
    pub ty: Type,
    pub value: Value,
    /// What evaluating it changed; already reverted. See [`Synthesizer::commit`].
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Synthesis {
    pub results: Vec<Synthesized>,
    pub evaluated: usize,
    pub threw: usize,
    pub timed_out: usize,
}

impl Synthesis {
    pub fn expressions(&self) -> impl Iterator<Item = &str> {
        self.results.iter().map(|r| r.expression.as_str())
    }
}

/// Synthesizes expressions in whatever frame `bridge` is paused in.
pub struct Synthesizer<B> {
    config: SynthConfig,
    bridge: B,
}

impl<B: ExecutionBridge> Synthesizer<B> {
    pub fn new(config: SynthConfig, bridge: B) -> Self {
        Self { config, bridge }
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut B {
        &mut self.bridge
    }

    pub fn into_bridge(self) -> B {
        self.bridge
    }

    /// Runs one request and returns the accepted candidates in search order.
    ///
    /// The heap is left as it was found; use [`Synthesizer::commit`] to keep a result's
    /// effects.
    pub fn synthesize(&mut self, request: SynthesisRequest) -> SynthResult<Synthesis> {
        let span = tracing::info_span!(
            "synthesis",
            skeleton = request.skeleton.as_deref().unwrap_or("??"),
            property = ?request.property,
        );
        let _guard = span.enter();

        let frame = self.bridge.frame()?;
        let store = TypeStore::load(&mut self.bridge, &frame)?;
        let constraint = request
            .property
            .initial_constraint(&store, request.static_type.as_ref());
        let max_depth = request.max_depth.unwrap_or(self.config.search.max_depth);
        let mut arena = ExprArena::new();
        let candidates = self.candidates(&mut arena, &request, &frame, &store, &constraint, max_depth)?;
        tracing::info!(
            target: "nova.synth",
            candidates = candidates.len(),
            constraint = %constraint,
            "enumerated candidates"
        );
        request.cancel.check()?;

        let handler = SideEffectHandler::new(self.config.effects.clone());
        handler.start(&mut self.bridge, &frame)?;
        let evaluated = EvaluationManager::new(
            &mut self.bridge,
            &self.config.evaluation,
            &frame,
            Some(&*handler),
            &request.cancel,
        )
        .evaluate(&arena, &candidates, Some(request.property.as_ref()));
        let stopped = handler.stop(&mut self.bridge);
        let evaluations = evaluated?;
        stopped?;

        let mut synthesis = Synthesis {
            evaluated: evaluations.len(),
            ..Synthesis::default()
        };
        for evaluation in evaluations {
            match evaluation.outcome {
                CandidateOutcome::Accepted(value) => synthesis.results.push(Synthesized {
                    expression: arena.text(evaluation.expr).to_owned(),
                    ty: arena.ty(evaluation.expr).clone(),
                    value,
                    effects: evaluation.effects,
                }),
                CandidateOutcome::Rejected(_) => {}
                CandidateOutcome::Threw(_) => synthesis.threw += 1,
                CandidateOutcome::TimedOut => synthesis.timed_out += 1,
            }
        }
        tracing::info!(
            target: "nova.synth",
            accepted = synthesis.results.len(),
            evaluated = synthesis.evaluated,
            threw = synthesis.threw,
            timed_out = synthesis.timed_out,
            "synthesis finished"
        );
        Ok(synthesis)
    }

    fn candidates(
        &mut self,
        arena: &mut ExprArena,
        request: &SynthesisRequest,
        frame: &FrameInfo,
        store: &TypeStore,
        constraint: &TypeConstraint,
        max_depth: u32,
    ) -> SynthResult<Vec<ExprId>> {
        let skeleton = request.skeleton.as_deref().map(Skeleton::parse).transpose()?;
        match skeleton {
            Some(skeleton) if !skeleton.is_single_free_hole() => {
                // One hole gets the whole depth; with more, each is one level shallower.
                let hole_depth = match skeleton.holes.len() {
                    1 => max_depth,
                    _ => max_depth.saturating_sub(1),
                } + self.config.search.extra_depth;
                SkeletonFiller::new(
                    arena,
                    &mut self.bridge,
                    store,
                    frame,
                    &self.config.denylist,
                    &request.cancel,
                    &skeleton.holes,
                    hole_depth,
                )
                .fill(&skeleton.expr, constraint)
            }
            _ => ExpressionGenerator::new(
                arena,
                &mut self.bridge,
                store,
                frame,
                &self.config.denylist,
                &request.cancel,
            )
            .generate(constraint, request.property.demonstration(), max_depth),
        }
    }

    /// Re-applies a result's effects so they persist.
    pub fn commit(&mut self, result: &Synthesized) -> SynthResult<()> {
        tracing::debug!(
            target: "nova.synth",
            expression = %result.expression,
            effects = result.effects.len(),
            "committing result"
        );
        redo_effects(&result.effects, &mut self.bridge)
    }
}
