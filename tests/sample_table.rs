mod common;

use common::TableBuilder;
use medianav::mp4::{SampleSizeKind, SampleTable, SeekMode};
use medianav::{Error, MemSource};
use std::sync::Arc;

#[test]
fn decode_times_accumulate_across_runs() {
    let table = TableBuilder::new()
        .stco(&[0])
        .stsc(&[(1, 5, 1)])
        .stsz(10, 5, &[])
        .stts(&[(3, 100), (2, 50)])
        .ctts(&[(5, 0)])
        .build();

    let mut cursor = table.cursor();
    let expected = [0, 100, 200, 300, 350];

    for (i, &time) in expected.iter().enumerate() {
        cursor.seek_to(i as u32).unwrap();
        assert_eq!(cursor.sample_time(), time, "sample {i}");
    }

    // Zero composition offsets leave composition == decode.
    for (i, &time) in expected.iter().enumerate() {
        let meta = table.sample_metadata(i as u32).unwrap();
        assert_eq!(meta.composition_time, time, "sample {i}");
    }

    // The delta of the run containing sample i separates i and i+1.
    let deltas = [100, 100, 100, 50];
    for (i, &delta) in deltas.iter().enumerate() {
        cursor.seek_to(i as u32).unwrap();
        let at = cursor.sample_time();
        cursor.seek_to(i as u32 + 1).unwrap();
        assert_eq!(cursor.sample_time() - at, delta);
    }
}

#[test]
fn composition_offsets_reorder_samples() {
    let table = TableBuilder::new()
        .stco(&[0])
        .stsc(&[(1, 4, 1)])
        .stsz(10, 4, &[])
        .stts(&[(4, 1000)])
        .ctts(&[(1, 0), (1, 2000), (1, 0), (1, 0)])
        .build();

    let expected = [0, 3000, 2000, 3000];
    for (i, &time) in expected.iter().enumerate() {
        let meta = table.sample_metadata(i as u32).unwrap();
        assert_eq!(meta.composition_time, time, "sample {i}");
    }

    assert_eq!(
        table.find_sample_at_time(2500, SeekMode::Closest).unwrap(),
        2
    );

    // Exact hits resolve to a sample with exactly that composition time,
    // whichever of the equal entries the sort put first.
    for mode in [SeekMode::Before, SeekMode::After, SeekMode::Closest] {
        let found = table.find_sample_at_time(3000, mode).unwrap();
        assert_eq!(
            table.sample_metadata(found).unwrap().composition_time,
            3000
        );
    }
}

#[test]
fn chunk_runs_fan_out_to_offsets() {
    let table = TableBuilder::new()
        .stco(&[0, 100, 200, 300])
        .stsc(&[(1, 2, 1), (3, 1, 1)])
        .stsz(10, 6, &[])
        .stts(&[(6, 10)])
        .build();

    assert_eq!(table.count_samples(), 6);
    assert_eq!(table.count_chunk_offsets(), 4);

    let mut cursor = table.cursor();
    let expected = [0, 10, 100, 110, 200, 300];
    for (i, &offset) in expected.iter().enumerate() {
        cursor.seek_to(i as u32).unwrap();
        assert_eq!(cursor.sample_offset(), offset, "sample {i}");
        assert_eq!(cursor.sample_size(), 10);
    }

    // Without a sync table every sample counts as sync.
    assert!(table.sample_metadata(3).unwrap().is_sync);
    assert_eq!(table.find_sync_sample_near(3, SeekMode::Before).unwrap(), 3);
}

#[test]
fn thumbnail_picks_largest_early_sync_sample() {
    let table = TableBuilder::new()
        .stco(&[0])
        .stsc(&[(1, 5, 1)])
        .stsz(0, 5, &[2000, 1, 5000, 1, 1000])
        .stts(&[(5, 100)])
        .stss(&[1, 3, 5])
        .build();

    assert_eq!(table.find_thumbnail_sample().unwrap(), 2);
    assert_eq!(table.num_sync_samples(), 3);
    assert_eq!(table.max_sample_size().unwrap(), 5000);
}

#[test]
fn temporal_search_boundaries() {
    let table = TableBuilder::new()
        .stco(&[0])
        .stsc(&[(1, 4, 1)])
        .stsz(10, 4, &[])
        .stts(&[(4, 1000)])
        .build();

    assert_eq!(table.find_sample_at_time(0, SeekMode::Before).unwrap(), 0);
    assert!(matches!(
        table.find_sample_at_time(u64::MAX, SeekMode::After),
        Err(Error::OutOfRange)
    ));

    // Past the end, any mode short of After clamps to the last sample.
    assert_eq!(
        table
            .find_sample_at_time(u64::MAX, SeekMode::Closest)
            .unwrap(),
        3
    );
}

#[test]
fn sync_sample_search_directions() {
    let table = TableBuilder::new()
        .stco(&[0])
        .stsc(&[(1, 12, 1)])
        .stsz(10, 12, &[])
        .stts(&[(12, 100)])
        .stss(&[5, 9])
        .build();

    // 0-based sync samples are 4 and 8.
    assert_eq!(table.find_sync_sample_near(6, SeekMode::Before).unwrap(), 4);
    assert_eq!(table.find_sync_sample_near(6, SeekMode::After).unwrap(), 8);
    assert_eq!(table.find_sync_sample_near(4, SeekMode::Closest).unwrap(), 4);

    // Sample 7 sits timewise closer to sync 8 than to sync 4.
    assert_eq!(table.find_sync_sample_near(7, SeekMode::Closest).unwrap(), 8);

    // No sync at or after sample 9.
    assert!(matches!(
        table.find_sync_sample_near(9, SeekMode::After),
        Err(Error::OutOfRange)
    ));

    // No sync at or before sample 0.
    assert!(matches!(
        table.find_sync_sample_near(0, SeekMode::Before),
        Err(Error::OutOfRange)
    ));

    // Sync membership via metadata, scanning forwards then rewinding.
    assert!(table.sample_metadata(4).unwrap().is_sync);
    assert!(!table.sample_metadata(5).unwrap().is_sync);
    assert!(table.sample_metadata(8).unwrap().is_sync);
    assert!(table.sample_metadata(4).unwrap().is_sync);
}

#[test]
fn iterator_invariants_over_mixed_runs() {
    let sizes = [10, 20, 30, 40, 50, 60, 70, 80, 90, 100];
    let table = TableBuilder::new()
        .stco(&[1000, 2000, 3000, 4000])
        .stsc(&[(1, 3, 1), (3, 2, 2)])
        .stsz(0, 10, &sizes)
        .stts(&[(10, 10)])
        .ctts(&[(5, 100), (5, 0)])
        .build();

    let mut cursor = table.cursor();

    // Within a chunk, samples are laid out back to back.
    let chunk_starts = [0u32, 3, 6, 8];
    let chunk_offsets = [1000u64, 2000, 3000, 4000];
    for (chunk, (&first, &base)) in chunk_starts.iter().zip(&chunk_offsets).enumerate() {
        let samples_in_chunk = if chunk < 2 { 3 } else { 2 };

        let mut offset = base;
        for i in first..first + samples_in_chunk {
            cursor.seek_to(i).unwrap();
            assert_eq!(cursor.sample_offset(), offset, "sample {i}");
            assert_eq!(cursor.sample_size(), sizes[i as usize]);
            offset += u64::from(sizes[i as usize]);
        }
    }

    // Composition = decode + offset, and description follows the run.
    for i in 0..10u32 {
        let meta = table.sample_metadata(i).unwrap();
        let decode = u64::from(i) * 10;
        let comp_offset = u64::from(table.composition_time_offset(i));
        assert_eq!(meta.composition_time, decode + comp_offset);
        assert_eq!(meta.sample_desc_index, if i < 6 { 1 } else { 2 });
    }

    // Backwards seeks rewind the cursor correctly.
    cursor.seek_to(9).unwrap();
    cursor.seek_to(0).unwrap();
    assert_eq!(cursor.sample_offset(), 1000);
    cursor.seek_to(5).unwrap();
    assert_eq!(cursor.sample_offset(), 2000 + 40 + 50);

    assert!(matches!(cursor.seek_to(10), Err(Error::BadIndex)));
    assert!(matches!(table.sample_metadata(10), Err(Error::BadIndex)));
}

#[test]
fn loading_an_index_twice_is_malformed() {
    let payload = common::stts(&[(4, 1000)]);
    let len = payload.len() as u64;
    let source = Arc::new(MemSource::new(payload));
    let mut table = SampleTable::new(source);

    table.set_time_to_sample_params(0, len).unwrap();
    assert!(matches!(
        table.set_time_to_sample_params(0, len),
        Err(Error::Malformed(_))
    ));
    assert!(!table.is_valid());
}

#[test]
fn default_sample_size_bounds() {
    let payload = common::stsz(7, 5, &[]);
    let len = payload.len() as u64;
    let source = Arc::new(MemSource::new(payload));
    let mut table = SampleTable::new(source);
    table
        .set_sample_size_params(SampleSizeKind::Stsz, 0, len)
        .unwrap();

    assert_eq!(table.count_samples(), 5);
    assert_eq!(table.max_sample_size().unwrap(), 7);
}
