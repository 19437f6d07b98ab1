//! # Alignment processor
//!
//! Drives one alignment run: set-up at run start, one call per event, statistics and the
//! steering file at run end.
//!
//! ## Run start
//!
//! [`AlignmentProcessor::new`] validates the parameters, builds the [`PlaneCatalog`] and the
//! [`AlignmentLabels`] and logs the configuration. Any error here is fatal for the run.
//!
//! ## Per event
//!
//! 1. Once more tracks than `max_candidates_total` were written, events are ignored.
//! 2. Internal search: hits of every configured collection are converted to µm and bucketed by
//!    z order. A missing collection skips the event.
//! 3. `only_single_hit_events`: events where a non-excluded plane does not hold exactly one hit
//!    are skipped.
//! 4. Candidate search; with `only_single_track_events`, events with more than one candidate are
//!    skipped.
//! 5. Pre-fitted input: at most `max_candidates_per_event` tracks of the track collection.
//! 6. Every candidate is fitted (failures drop the candidate), optionally cut on its fitted
//!    residuals and emitted to the sink.
//!
//! Per-event and per-candidate failures never abort the run; sink I/O errors do.
//!
//! ## Example
//!
//! ```rust
//! use telmille::geometry::TelescopeLayout;
//! use telmille::hits::{Event, RawHit};
//! use telmille::mille::MemorySink;
//! use telmille::params::AlignParams;
//! use telmille::processor::AlignmentProcessor;
//!
//! let layout = TelescopeLayout::straight(&[(0, 0.0), (1, 150.0), (2, 300.0)], 0.0184);
//! let mut processor =
//!     AlignmentProcessor::new(&layout, AlignParams::default(), MemorySink::default()).unwrap();
//!
//! let event = Event::new(1, 0).with_hits(
//!     "corrhits",
//!     vec![
//!         RawHit::measured(0, 0.100, 0.200, 0.0),
//!         RawHit::measured(1, 0.115, 0.190, 150.0),
//!         RawHit::measured(2, 0.130, 0.180, 300.0),
//!     ],
//! );
//! let summary = processor.process_event(&event).unwrap();
//! assert_eq!(summary.tracks_written, 1);
//!
//! let stats = processor.finish().unwrap();
//! assert_eq!(stats.records_written, 9);
//! ```
use std::{fmt, fs::File, io::BufWriter};

use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::{
    constants::PROGRESS_EVENT_INTERVAL,
    derivatives::DerivativeBuilder,
    geometry::{GeometryProvider, PlaneCatalog},
    hits::{EventData, HitStore},
    labels::AlignmentLabels,
    mille::{write_steering, MilleBinaryWriter, RecordSink},
    params::{AlignParams, InputMode},
    telmille_errors::TelMilleError,
    track_fit::{DampedNewton, FittedTrack, Minimizer, TrackFitter},
    track_search::TrackCandidateSearch,
};

/// Why an event produced no track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The run-wide track cap was already exceeded.
    TrackCapReached,
    MissingCollection(String),
    NotSingleHit,
    NotSingleTrack,
}

/// Outcome of [`AlignmentProcessor::process_event`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSummary {
    pub candidates: usize,
    pub tracks_written: usize,
    pub records_written: usize,
    pub skipped: Option<SkipReason>,
}

impl EventSummary {
    fn skipped(reason: SkipReason) -> Self {
        EventSummary {
            skipped: Some(reason),
            ..EventSummary::default()
        }
    }
}

/// Counters of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStatistics {
    pub events: u64,
    pub skipped_events: u64,
    pub candidates: u64,
    pub tracks_written: u64,
    pub records_written: u64,
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} events ({} skipped), {} candidates, {} tracks, {} records",
            self.events, self.skipped_events, self.candidates, self.tracks_written,
            self.records_written
        )
    }
}

/// Per-run driver of the search, fit and derivative emission.
#[derive(Debug)]
pub struct AlignmentProcessor<S: RecordSink, M: Minimizer = DampedNewton> {
    params: AlignParams,
    catalog: PlaneCatalog,
    labels: AlignmentLabels,
    search: TrackCandidateSearch,
    fitter: TrackFitter<M>,
    sink: S,
    stats: RunStatistics,
}

impl AlignmentProcessor<MilleBinaryWriter<BufWriter<File>>> {
    /// Processor writing to the Mille binary file named in `params`, created (truncated) here
    /// once the parameters are valid.
    pub fn open<G: GeometryProvider + ?Sized>(
        geometry: &G,
        params: AlignParams,
    ) -> Result<Self, TelMilleError> {
        let params = params.validate()?;
        let sink = MilleBinaryWriter::create(&params.binary_filename, params.double_precision)?;
        Self::new(geometry, params, sink)
    }
}

impl<S: RecordSink> AlignmentProcessor<S, DampedNewton> {
    /// Run start with the default minimizer configured from `params.minimizer`.
    pub fn new<G: GeometryProvider + ?Sized>(
        geometry: &G,
        params: AlignParams,
        sink: S,
    ) -> Result<Self, TelMilleError> {
        let minimizer = DampedNewton::from(&params.minimizer);
        Self::with_minimizer(geometry, params, sink, minimizer)
    }
}

impl<S: RecordSink, M: Minimizer> AlignmentProcessor<S, M> {
    /// Run start.
    ///
    /// Arguments
    /// -----------------
    /// * `geometry`: plane description.
    /// * `params`: run configuration, validated again here.
    /// * `sink`: destination of the derivative records.
    /// * `minimizer`: χ² minimizer of the track fit.
    ///
    /// Return
    /// ----------
    /// * The processor, or the first configuration error.
    pub fn with_minimizer<G: GeometryProvider + ?Sized>(
        geometry: &G,
        params: AlignParams,
        sink: S,
        minimizer: M,
    ) -> Result<Self, TelMilleError> {
        let params = params.validate()?;
        let catalog = PlaneCatalog::new(geometry, &params)?;
        let labels = AlignmentLabels::allocate(&catalog.sensor_ids());

        info!(
            mode = %params.alignment_mode,
            planes = catalog.len(),
            sensors = %catalog.sensor_ids().iter().join(" "),
            excluded = %params.excluded_sensor_ids.iter().join(" "),
            fixed = %params.fixed_sensor_ids.iter().join(" "),
            "alignment run configured"
        );
        info!(
            dofs = %params.alignment_mode.active_dofs().iter().join(", "),
            labels = labels.len(),
            "alignment parameters"
        );
        debug!("\n{params}");

        Ok(AlignmentProcessor {
            search: TrackCandidateSearch::new(
                params.max_missing_hits,
                params.max_candidates_per_event,
            ),
            fitter: TrackFitter::new(params.max_missing_hits, minimizer),
            params,
            catalog,
            labels,
            sink,
            stats: RunStatistics::default(),
        })
    }

    pub fn catalog(&self) -> &PlaneCatalog {
        &self.catalog
    }

    pub fn labels(&self) -> &AlignmentLabels {
        &self.labels
    }

    pub fn params(&self) -> &AlignParams {
        &self.params
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn statistics(&self) -> RunStatistics {
        self.stats
    }

    /// Process one event.
    ///
    /// Return
    /// ----------
    /// * What the event contributed, with the reason when it was skipped.
    /// * `Err` only for sink I/O errors.
    pub fn process_event<E: EventData + ?Sized>(
        &mut self,
        event: &E,
    ) -> Result<EventSummary, TelMilleError> {
        self.stats.events += 1;
        if self.stats.events % PROGRESS_EVENT_INTERVAL == 0 {
            info!(
                events = self.stats.events,
                tracks = self.stats.tracks_written,
                records = self.stats.records_written,
                "progress"
            );
        }

        let summary = if self.stats.tracks_written > self.params.max_candidates_total as u64 {
            EventSummary::skipped(SkipReason::TrackCapReached)
        } else {
            match self.params.input_mode {
                InputMode::InternalSearch => self.process_hits(event)?,
                InputMode::PrefittedTracks => self.process_tracks(event)?,
            }
        };

        if summary.skipped.is_some() {
            self.stats.skipped_events += 1;
        }
        self.stats.candidates += summary.candidates as u64;
        self.stats.tracks_written += summary.tracks_written as u64;
        self.stats.records_written += summary.records_written as u64;
        Ok(summary)
    }

    /// Flush the sink, write the steering file if configured and return the run statistics.
    pub fn finish(&mut self) -> Result<RunStatistics, TelMilleError> {
        self.sink.flush()?;
        if let Some(steering) = &self.params.steering {
            write_steering(
                &self.params.binary_filename,
                &self.catalog,
                self.params.alignment_mode,
                &self.labels,
                steering,
            )?;
        }
        info!(statistics = %self.stats, "alignment run finished");
        Ok(self.stats)
    }

    fn process_hits<E: EventData + ?Sized>(
        &mut self,
        event: &E,
    ) -> Result<EventSummary, TelMilleError> {
        let mut store = HitStore::new(self.catalog.len());
        for name in &self.params.hit_collection_names {
            let Some(hits) = event.hit_collection(name) else {
                return Ok(self.missing_collection(event, name));
            };
            for hit in hits {
                store.insert_raw(&self.catalog, hit);
            }
        }

        if self.params.only_single_hit_events
            && self
                .catalog
                .active_planes()
                .any(|p| store.hits_on(p.z_order).len() != 1)
        {
            debug!(event = event.event_number(), "event without a single hit per plane skipped");
            return Ok(EventSummary::skipped(SkipReason::NotSingleHit));
        }

        let candidates = self.search.search(&self.catalog, &store);
        debug!(
            event = event.event_number(),
            hits = %(0..store.n_planes()).map(|z| store.hits_on(z).len()).join(" "),
            candidates = candidates.len(),
            "track search"
        );
        if self.params.only_single_track_events && candidates.len() > 1 {
            return Ok(EventSummary::skipped(SkipReason::NotSingleTrack));
        }

        let mut summary = EventSummary {
            candidates: candidates.len(),
            ..EventSummary::default()
        };
        for candidate in &candidates {
            let hits = candidate.hits(&store);
            match self.fitter.fit(&self.catalog, &hits) {
                Ok(track) => self.emit(&track, &mut summary)?,
                Err(err) => debug!(event = event.event_number(), %err, "candidate dropped"),
            }
        }
        Ok(summary)
    }

    fn process_tracks<E: EventData + ?Sized>(
        &mut self,
        event: &E,
    ) -> Result<EventSummary, TelMilleError> {
        let name = &self.params.track_collection_name;
        let Some(tracks) = event.track_collection(name) else {
            return Ok(self.missing_collection(event, name));
        };

        let taken = tracks.len().min(self.params.max_candidates_per_event);
        debug!(
            event = event.event_number(),
            available = tracks.len(),
            taken,
            "pre-fitted tracks"
        );

        let mut summary = EventSummary {
            candidates: taken,
            ..EventSummary::default()
        };
        for track in &tracks[..taken] {
            let fitted = self.fitter.extract_residuals(&self.catalog, track);
            self.emit(&fitted, &mut summary)?;
        }
        Ok(summary)
    }

    fn missing_collection<E: EventData + ?Sized>(&self, event: &E, name: &str) -> EventSummary {
        let err = TelMilleError::MissingCollection {
            name: name.to_string(),
            run: event.run_number(),
            event: event.event_number(),
        };
        warn!("{err}");
        EventSummary::skipped(SkipReason::MissingCollection(name.to_string()))
    }

    /// Residual cut (if enabled) and derivative emission of one track.
    fn emit(&mut self, track: &FittedTrack, summary: &mut EventSummary) -> Result<(), TelMilleError> {
        if self.params.use_residual_cuts && !self.passes_residual_cuts(track) {
            debug!("track rejected by the residual cuts");
            return Ok(());
        }

        let builder =
            DerivativeBuilder::new(&self.catalog, &self.labels, self.params.alignment_mode);
        let records = builder.build_and_emit(track, &mut self.sink)?;
        if records > 0 {
            summary.tracks_written += 1;
            summary.records_written += records;
        }
        Ok(())
    }

    fn passes_residual_cuts(&self, track: &FittedTrack) -> bool {
        track.planes.iter().all(|entry| {
            self.catalog.plane(entry.z_order).map_or(true, |plane| {
                !entry.contributes(plane)
                    || plane
                        .residual_window
                        .contains(entry.residual.x, entry.residual.y)
            })
        })
    }
}
