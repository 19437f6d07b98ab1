mod common;

use std::fs::File;

use camino::Utf8PathBuf;
use common::{random_events, telescope, Z_MM};
use rand::{rngs::StdRng, SeedableRng};
use telmille::{
    alignment_mode::AlignmentMode,
    mille::{MemorySink, MilleBinaryWriter, MilleReader, MilleTrack},
    params::{AlignParams, SteeringParams},
    processor::AlignmentProcessor,
};

fn utf8(dir: &tempfile::TempDir, name: &str) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap()
}

fn read_tracks(path: &Utf8PathBuf) -> Vec<MilleTrack> {
    MilleReader::new(File::open(path).unwrap())
        .collect::<Result<_, _>>()
        .unwrap()
}

#[test]
fn binary_file_holds_one_block_per_track() {
    let dir = tempfile::tempdir().unwrap();
    let binary = utf8(&dir, "run.bin");
    let steering = utf8(&dir, "steer.txt");

    let params = AlignParams::builder()
        .alignment_mode(AlignmentMode::XYShiftXYRot)
        .binary_filename(binary.clone())
        .steering(SteeringParams {
            file_name: steering.clone(),
            additional_commands: vec!["chisqcut 5.0 2.5".into()],
            ..SteeringParams::default()
        })
        .build()
        .unwrap();

    let mut rng = StdRng::seed_from_u64(0xA11);
    let mut processor = AlignmentProcessor::open(&telescope(), params).unwrap();
    for event in random_events(&mut rng, 25, 3.5) {
        processor.process_event(&event).unwrap();
    }
    let stats = processor.finish().unwrap();
    assert_eq!(stats.tracks_written, 25);
    assert_eq!(stats.records_written, 25 * 3 * Z_MM.len() as u64);

    let tracks = read_tracks(&binary);
    assert_eq!(tracks.len(), 25);
    for track in &tracks {
        assert!(!track.double_precision);
        assert_eq!(track.records.len(), 3 * Z_MM.len());
        for record in &track.records {
            assert!(record.sigma > 0.0);
            // only non-zero derivatives are stored, labels are positive
            assert!(record.global.iter().all(|&(label, d)| label > 0 && d != 0.0));
            assert!(record.local.iter().all(|&(i, _)| (1..=4).contains(&i)));
        }
    }

    let text = std::fs::read_to_string(&steering).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Cfiles");
    assert_eq!(lines[1], binary.as_str());
    // six planes, three labels each in mode 2
    assert_eq!(
        lines.iter().filter(|l| l.ends_with(" 0.0 -1.0")).count(),
        2 * 3
    );
    assert!(lines.contains(&"chisqcut 5.0 2.5"));
    assert_eq!(lines.last(), Some(&"end"));
}

#[test]
fn memory_buffers_replay_into_the_file_sink_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let direct = utf8(&dir, "direct.bin");
    let replayed = utf8(&dir, "replayed.bin");

    let mut rng = StdRng::seed_from_u64(99);
    let events = random_events(&mut rng, 10, 4.0);

    let params = AlignParams::builder()
        .binary_filename(direct.clone())
        .double_precision(true)
        .build()
        .unwrap();
    let mut file_run = AlignmentProcessor::open(&telescope(), params.clone()).unwrap();
    let mut memory_run =
        AlignmentProcessor::new(&telescope(), params, MemorySink::default()).unwrap();
    for event in &events {
        file_run.process_event(event).unwrap();
        memory_run.process_event(event).unwrap();
    }
    file_run.finish().unwrap();

    let mut writer = MilleBinaryWriter::create(&replayed, true).unwrap();
    memory_run.sink().replay_into(&mut writer).unwrap();
    writer.into_inner().unwrap();

    assert_eq!(
        std::fs::read(&direct).unwrap(),
        std::fs::read(&replayed).unwrap()
    );
    let tracks = read_tracks(&replayed);
    assert_eq!(tracks.len(), 10);
    assert!(tracks.iter().all(|t| t.double_precision));
}

#[test]
fn binary_file_in_a_missing_directory_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let params = AlignParams::builder()
        .binary_filename(utf8(&dir, "no/such/dir/mille.bin"))
        .build()
        .unwrap();

    assert!(matches!(
        AlignmentProcessor::open(&telescope(), params),
        Err(telmille::TelMilleError::IoError(_))
    ));
}

#[test]
fn invalid_parameters_leave_an_existing_binary_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let binary = utf8(&dir, "mille.bin");
    std::fs::write(&binary, b"previous run").unwrap();

    let params = AlignParams {
        binary_filename: binary.clone(),
        max_candidates_per_event: 0,
        ..AlignParams::default()
    };

    assert!(matches!(
        AlignmentProcessor::open(&telescope(), params),
        Err(telmille::TelMilleError::InvalidAlignParameter(_))
    ));
    assert_eq!(std::fs::read(&binary).unwrap(), b"previous run");
}
