use std::str;

use std::error::Error;
use rust_htslib::bcf::Read as BcfRead;
use std::ops::Deref;
use std::path::Path;
use std::convert::TryFrom;
use regex::Regex;
use log::{debug, info};
use crate::lib::common::{*};


/// the name under which a vcf sample appears in the reports,
/// which is simply the file name of the input vcf
///
/// Unittest: TRUE
pub fn sample_name(file: &str) -> String {
    match Path::new(file).file_name() {
        Some(name) => name
            .to_str()
            .expect("ERROR: could not convert file name to string!")
            .to_string(),
        None => panic!("ERROR: could not extract a file name from the vcf path!"),
    }
}

/// the raw SVTYPE annotation of a record, every structural variant
/// record must carry one
pub fn extract_sv_type(record: &rust_htslib::bcf::Record) -> String {
    let sv_full = record
        .info(b"SVTYPE")
        .string()
        .expect("ERROR: could not access the SVTYPE field!")
        .expect("ERROR: all records must have an annotated SVTYPE!");
    str::from_utf8(sv_full[0])
        .expect("ERROR: could not extract SVTYPE string!")
        .to_string()
}

/// first value of an integer INFO field if the record carries it
///
/// Unittest: TRUE
pub fn info_integer(
    record: &rust_htslib::bcf::Record,
    tag: &[u8]
) -> Option<i64> {
    let info = match record.info(tag).integer() {
        Ok(x) => x,
        Err(_e) => None,
    };
    match info {
        None => None,
        Some(x) => {
            let values = x.deref();
            // the htslib missing sentinel counts as absent
            if values.is_empty() || values[0] == i32::MIN {
                None
            }else{
                Some(i64::from(values[0]))
            }
        }
    }
}

/// first value of a string INFO field if the record carries it
///
/// Unittest: TRUE
pub fn info_string(
    record: &rust_htslib::bcf::Record,
    tag: &[u8]
) -> Option<String> {
    match record.info(tag).string() {
        Ok(Some(values)) => match values.first() {
            Some(value) => Some(
                str::from_utf8(value)
                    .expect("ERROR: could not convert INFO field to string!")
                    .to_string(),
            ),
            None => None,
        },
        _ => None,
    }
}

/// end position of an intra-chromosomal record. Callers disagree on
/// where they put it, so we look for SVEND first, then END and
/// finally derive it from POS + |SVLEN|
///
/// Unittest: TRUE
pub fn extract_end(
    record: &rust_htslib::bcf::Record,
    pos: u64
) -> Option<u64> {
    match info_integer(record, b"SVEND") {
        Some(end) => u64::try_from(end).ok(),
        None => match info_integer(record, b"END") {
            Some(end) => u64::try_from(end).ok(),
            None => info_integer(record, b"SVLEN")
                .map(|sv_len| pos + sv_len.unsigned_abs()),
        },
    }
}

/// supporting read depth of a record: the INFO DP value when present,
/// otherwise the FORMAT DP of the first sample, otherwise 0
///
/// Unittest: TRUE
pub fn extract_depth(record: &rust_htslib::bcf::Record) -> u32 {
    if let Some(depth) = info_integer(record, b"DP") {
        return u32::try_from(depth).unwrap_or(0);
    }
    match record.format(b"DP").integer() {
        Ok(values) => {
            if values.is_empty() || values[0].is_empty() || values[0][0] < 0 {
                0
            }else{
                u32::try_from(values[0][0]).unwrap_or(0)
            }
        }
        Err(_e) => 0,
    }
}

/// mate breakpoint of a translocation record, parsed from the
/// break-end ALT notation when possible with the INFO fields CHR2
/// and END as fallback for callers which do not write a proper ALT
///
/// Unittest: TRUE
pub fn extract_mate(
    record: &rust_htslib::bcf::Record,
    mate_re: &Regex
) -> Option<(String, u64)> {
    let alleles = record.alleles();
    if alleles.len() > 1 {
        let alt = str::from_utf8(alleles[1]).expect("ERROR: could not convert allele!");
        if let Some(captures) = mate_re.captures(alt) {
            let chrom = captures.get(1).unwrap().as_str().to_string();
            let pos = captures
                .get(2)
                .unwrap()
                .as_str()
                .parse::<u64>()
                .expect("ERROR: could not parse mate position!");
            return Some((chrom, pos));
        }
    }
    match (info_string(record, b"CHR2"), info_integer(record, b"END")) {
        (Some(chrom), Some(end)) => match u64::try_from(end) {
            Ok(pos) => Some((chrom, pos)),
            Err(_e) => None,
        },
        _ => None,
    }
}

/// reads all structural variant events of one vcf into an EventStore.
/// Records overlapping an exclusion region are dropped and counted,
/// with translocations only everything but CTX records is dropped as
/// well. Intra-chromosomal records take their second breakpoint from
/// the end fallback chain, translocation records from the break-end
/// ALT or the mate fallback
///
/// Unittest: TRUE
pub fn load_events_from_vcf(
    file: &str,
    exclusions: &[ExclusionRegion],
    flanking: u64,
    trans_only: bool
) -> EventStore {
    info!("Reading SV-events from sample: {}", file);
    let mate_re =
        Regex::new(r"([\d\w_]+):(\d+)").expect("ERROR: could not compile the mate regex!");
    let mut vcf =
        rust_htslib::bcf::Reader::from_path(file).expect("ERROR: could not open vcf file!");
    let mut store = EventStore::new(&sample_name(file));
    let mut skipped_events: u64 = 0;
    for entry in vcf.records() {
        let record = entry.expect("ERROR: could not read record of vcf file!");
        let sv_type = SVType::from_vcf(&extract_sv_type(&record));
        if trans_only && sv_type != SVType::CTX {
            continue;
        }
        let rid = record.rid().expect("ERROR: could not get reference id of record!");
        let chromosome = str::from_utf8(
            record
                .header()
                .rid2name(rid)
                .expect("ERROR: could not convert rid to chromosome name!"),
        )
        .expect("ERROR: could not convert chromosome name to string!")
        .to_string();
        // htslib is 0-based, the event model is 1-based like the vcf itself
        let pos = u64::try_from(record.pos())
            .expect("ERROR: got negative chromosomal position!")
            + 1;
        if exclusions.iter().any(|region| region.overlaps(&chromosome, pos)) {
            skipped_events += 1;
            continue;
        }
        let method = info_string(&record, b"SVMETHOD").unwrap_or_default();
        let depth = extract_depth(&record);
        let event = if sv_type == SVType::CTX {
            let (chr_b, pos_b) = extract_mate(&record, &mate_re)
                .expect("ERROR: translocation record without a derivable mate breakpoint!");
            Event::new(&chromosome, pos, &chr_b, pos_b, sv_type, depth, &method, flanking)
        }else{
            let end = extract_end(&record, pos)
                .expect("ERROR: could not derive the end position of a record!");
            Event::new(&chromosome, pos, &chromosome, end, sv_type, depth, &method, flanking)
        };
        debug!("loaded event {} of type {}", event.locus(), event.sv_type);
        store.add(event);
    }
    info!("Skipped {} events overlapping excluded regions", skipped_events);
    info!("Loaded SV-events from sample: {}", store.len());
    store
}

/// the full merge: loads every sample in the given order, folds each
/// one into the cluster table and renders all reports. Input files
/// are opened one at a time and closed again before the next one
///
/// Unittest: TRUE
#[allow(clippy::too_many_arguments)]
pub fn run_merge(
    vcf_files: &[String],
    exclusion_files: &[String],
    flanking: u64,
    trans_only: bool,
    tsv_out: &str,
    bed_out: &str,
    vcf_out: &str,
    regions_out: &str,
    version: &str
) -> Result<(), Box<dyn Error>> {
    let exclusions = build_exclusion_list(exclusion_files);
    let mut engine = ClusterEngine::new();
    for file in vcf_files {
        let store = load_events_from_vcf(file, &exclusions, flanking, trans_only);
        engine.add_sample(store);
    }
    info!(
        "Merged {} calls into {} consensus events",
        engine.events.len(),
        engine.clusters.len()
    );
    write_merged_reports(&engine, tsv_out, bed_out, vcf_out, regions_out, version)
}
