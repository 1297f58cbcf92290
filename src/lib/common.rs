use rustc_hash::FxHashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::fs::File;
use std::error::Error;
use std::fmt;
use std::io::Read as IoRead;
use std::io::Write;
use chrono::{DateTime, Local};
use itertools::Itertools;
use human_sort::compare;
use sha2::{Digest, Sha256};
use log::{debug, info};


/// the default centerpoint flanking in bp.
/// Only consumed by the argument parsing, everything downstream
/// gets the value passed explicitly
pub const DEFAULT_FLANKING: u64 = 100;

#[derive(Debug,Clone,Eq,Hash,PartialEq,Copy,Default)]
pub enum SVType  {
    DEL,
    INS,
    DUP,
    INV,
    ITX,
    CTX,
    #[default]
    Unknown,
}

impl SVType {
    /// translates the SVTYPE field of a vcf record.
    /// Callers use historically grown names for the same thing,
    /// e.g. yamsvc writes bITX for intra-chromosomal jumps and
    /// TRA is a common synonym for inter-chromosomal translocations.
    /// Everything which is none of the known types becomes Unknown
    ///
    /// Unittest: TRUE
    ///
    pub fn from_vcf(raw: &str) -> SVType {
        match raw {
            "DEL"          => SVType::DEL,
            "INS"          => SVType::INS,
            "DUP"          => SVType::DUP,
            "INV"          => SVType::INV,
            "ITX" | "bITX" => SVType::ITX,
            "CTX" | "TRA"  => SVType::CTX,
            _              => SVType::Unknown,
        }
    }
}

impl fmt::Display for SVType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            SVType::DEL     => "DEL",
            SVType::INS     => "INS",
            SVType::DUP     => "DUP",
            SVType::INV     => "INV",
            SVType::ITX     => "ITX",
            SVType::CTX     => "CTX",
            SVType::Unknown => "UNKNOWN",
        };
        write!(f, "{}", name)
    }
}

/// a genomic region within which calls are not trusted,
/// e.g. low complexity or decoy sections of an assembly.
/// Both boundaries are inclusive
#[derive(Debug,Clone,Default,PartialEq,Eq)]
pub struct ExclusionRegion {
    // the chromosome of the region
    pub chrom: String,
    // first position of the region, inclusive
    pub start: u64,
    // last position of the region, inclusive
    pub end: u64,
}

impl ExclusionRegion {
    /// true if the position lies within the region, boundaries included
    ///
    /// Unittest: TRUE
    ///
    pub fn overlaps(
        &self,
        chrom: &str,
        pos: u64
    ) -> bool {
        self.chrom == chrom && self.start <= pos && pos <= self.end
    }
}

/// this function takes 1-n bed-like files with chromosome, start
/// and end in the first 3 tab-separated columns and returns the
/// regions as a flat list. Additional columns are ignored, regions
/// are neither merged nor sorted
///
/// Unittest: TRUE
///
pub fn build_exclusion_list(
    files: &[String]
) -> Vec<ExclusionRegion> {
    let mut regions : Vec<ExclusionRegion> = Vec::new();
    for my_file in files {
        debug!("Loading exclusion regions from {}", my_file);
        assert!(
            Path::new(my_file).exists(),
            "ERROR: exclusion region file {:?} does not exist!",
            my_file
        );
        let input  = File::open(my_file).expect("ERROR: could not open exclusion region file!");
        let reader = BufReader::new(input);
        for l in reader.lines() {
            let line = l.expect("ERROR: could not read line!");
            if line.is_empty() {
                continue;
            }
            let elements: Vec<&str> = line.split('\t').collect();
            if elements.len() < 3 {
                panic!("ERROR: exclusion regions must be tab-separated with chromosome, start and end!");
            }
            regions.push(ExclusionRegion {
                chrom: elements[0].to_string(),
                start: elements[1].parse::<u64>().expect("ERROR: could not parse start of exclusion region!"),
                end:   elements[2].parse::<u64>().expect("ERROR: could not parse end of exclusion region!"),
            });
        }
    }
    info!("Loaded {} exclusion regions", regions.len());
    regions
}


/// one structural variant as reported by a single caller, reduced
/// to its pair of breakpoints. Positions are 1-based as in the vcf.
/// The breakpoints are stored sorted so that (chr_a,pos_a) <= (chr_b,pos_b)
/// under tuple ordering, which makes two events comparable independent
/// of the orientation they had in the input
#[derive(Debug,Clone,Default,PartialEq,Eq)]
pub struct Event {
    // first chromosome of the breakpoint pair
    pub chr_a: String,
    // position on the first chromosome, 1-based
    pub pos_a: u64,
    // second chromosome of the breakpoint pair
    pub chr_b: String,
    // position on the second chromosome, 1-based
    pub pos_b: u64,
    // the type
    pub sv_type: SVType,
    // supporting read depth of the call
    pub depth: u32,
    // the caller which reported the event, as found in the vcf
    pub method: String,
    // allowed centerpoint deviation when matching against others
    pub flanking: u64,
    // both chromosome names sorted and concatenated, identifies
    // the pair of chromosomes independent of their order
    pub virtual_chr: String,
}

impl Event {
    /// builds an event from a pair of breakpoints in any order.
    /// The endpoints are canonicalized so that constructing with
    /// swapped breakpoints yields the identical event
    ///
    /// Unittest: TRUE
    ///
    pub fn new(
        chr_a: &str,
        pos_a: u64,
        chr_b: &str,
        pos_b: u64,
        sv_type: SVType,
        depth: u32,
        method: &str,
        flanking: u64
    ) -> Event {
        let ((chr_a, pos_a), (chr_b, pos_b)) = if (chr_b, pos_b) < (chr_a, pos_a) {
            ((chr_b, pos_b), (chr_a, pos_a))
        }else{
            ((chr_a, pos_a), (chr_b, pos_b))
        };
        let mut chroms = [chr_a, chr_b];
        chroms.sort_unstable();
        Event {
            chr_a: chr_a.to_string(),
            pos_a,
            chr_b: chr_b.to_string(),
            pos_b,
            sv_type,
            depth,
            method: method.to_string(),
            flanking,
            virtual_chr: chroms.concat(),
        }
    }

    /// distance between the two breakpoint positions.
    /// For inter-chromosomal events this has no biological meaning
    /// but is still reported for completeness
    pub fn size(&self) -> u64 {
        self.pos_a.abs_diff(self.pos_b)
    }

    /// midpoint between the two breakpoint positions,
    /// rounded down
    pub fn centerpoint(&self) -> u64 {
        self.pos_a.min(self.pos_b) + self.size() / 2
    }

    /// the caller name with version suffixes collapsed, so that
    /// e.g. clever-sv-2.0 and clever-2.1 count as the same method
    pub fn sv_method(&self) -> &str {
        if self.method.starts_with("clever") {
            "clever"
        }else if self.method.starts_with("breakdancer") {
            "breakdancer"
        }else{
            &self.method
        }
    }

    /// the canonical string form of the breakpoint pair,
    /// e.g. chr1:100-200 or chr1:100-chr5:500
    ///
    /// Unittest: TRUE
    ///
    pub fn locus(&self) -> String {
        if self.chr_a == self.chr_b {
            format!("{}:{}-{}", self.chr_a, self.pos_a, self.pos_b)
        }else{
            format!("{}:{}-{}:{}", self.chr_a, self.pos_a, self.chr_b, self.pos_b)
        }
    }

    /// stable digest of the canonical string form, used as the
    /// key of the cluster an event founds
    ///
    /// Unittest: TRUE
    ///
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.locus().as_bytes());
        let result = hasher.finalize();
        format!("{:x}", result)
    }

    /// decides whether two events describe the same underlying variant.
    /// Both must span the same pair of chromosomes, their centerpoints
    /// must lie within the flanking of the first operand and the two
    /// windows of centerpoint +- flanking must truly intersect. The
    /// distance check makes the window test mostly redundant, both are
    /// kept as the historical behavior did.
    /// The predicate is reflexive and symmetric but NOT transitive,
    /// which is why cluster assignment uses an explicit first-match rule.
    /// Note that the type of the events is not compared
    ///
    /// Unittest: TRUE
    ///
    pub fn matches(
        &self,
        other: &Event
    ) -> bool {
        if self.virtual_chr != other.virtual_chr {
            return false;
        }
        let cp_a = self.centerpoint();
        let cp_b = other.centerpoint();
        if cp_a.abs_diff(cp_b) > self.flanking {
            return false;
        }
        let lft_a = cp_a.saturating_sub(self.flanking);
        let rgt_a = cp_a + self.flanking;
        let lft_b = cp_b.saturating_sub(self.flanking);
        let rgt_b = cp_b + self.flanking;
        // right edge of A inside the window of B
        if lft_b <= rgt_a && rgt_a <= rgt_b {
            return true;
        }
        // left edge of A inside the window of B
        if lft_b <= lft_a && lft_a <= rgt_b {
            return true;
        }
        // one window contained in the other
        if (lft_b >= lft_a && rgt_b <= rgt_a) || (lft_b <= lft_a && rgt_b >= rgt_a) {
            return true;
        }
        false
    }

    /// the ALT field for the merged vcf. Intra-chromosomal events
    /// carry no useful ALT, everything spanning two positions that
    /// need both to be named uses break-end notation
    pub fn vcf_alt(&self) -> String {
        if self.chr_a == self.chr_b && self.sv_type != SVType::ITX {
            String::from(".")
        }else{
            format!("N[{}:{}[", self.chr_b, self.pos_b)
        }
    }

    /// the raw per-event bed lines for the all-regions track.
    /// Intra-chromosomal events span their interval, inter-chromosomal
    /// events get one anchor line of 100 bp per breakpoint
    ///
    /// Unittest: TRUE
    ///
    pub fn region_rows(&self) -> Vec<String> {
        if self.chr_a == self.chr_b {
            vec![format!("{}\t{}\t{}\tindel", self.chr_a, self.pos_a, self.pos_b)]
        }else{
            vec![
                format!("{}\t{}\t{}\tctx", self.chr_a, self.pos_a, self.pos_a + 100),
                format!("{}\t{}\t{}\tctx", self.chr_b, self.pos_b, self.pos_b + 100),
            ]
        }
    }
}


/// all events of one sample, grouped by the virtual chromosome.
/// Within a group the input order of the vcf is kept
#[derive(Debug,Clone,Default)]
pub struct EventStore {
    // the sample name, for reporting the basename of the vcf file
    pub sample: String,
    // virtual chromosome -> events in input order
    pub by_chrom: FxHashMap<String,Vec<Event>>,
}

impl EventStore {
    pub fn new(sample: &str) -> EventStore {
        EventStore {
            sample: sample.to_string(),
            by_chrom: FxHashMap::default(),
        }
    }

    /// files an event under its virtual chromosome
    pub fn add(&mut self, event: Event) {
        self.by_chrom.entry(event.virtual_chr.clone()).or_default().push(event);
    }

    /// number of events over all virtual chromosomes
    pub fn len(&self) -> usize {
        self.by_chrom.values().map(|events| events.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_chrom.is_empty()
    }
}


/// one consensus cluster: the events which different samples
/// contributed for the same underlying variant. Members are
/// indices into the arena of the ClusterEngine, a cluster never
/// holds more than one event per sample and always at least
/// its founding member
#[derive(Debug,Clone,Default)]
pub struct Cluster {
    // hex digest of the founding event, the key in the table
    pub key: String,
    // per member the index of the owning sample and the index of
    // the event in the arena, in the order of joining
    pub members: Vec<(usize,usize)>,
}

impl Cluster {
    /// the arena index of the event a given sample contributed, if any
    pub fn event_of(&self, sample_idx: usize) -> Option<usize> {
        self.members.iter().find(|(s, _)| *s == sample_idx).map(|(_, e)| *e)
    }
}

/// the accumulating structure of the merge. All events of all samples
/// live in one flat arena in load order, the lookup tables organize
/// them into clusters per virtual chromosome. Events do not point back
/// to their cluster, membership is only recorded here
#[derive(Debug,Default)]
pub struct ClusterEngine {
    // all events of all samples, in load order
    pub events: Vec<Event>,
    // for each arena entry the index of the sample it came from
    pub event_sample: Vec<usize>,
    // the sample names in processing order
    pub samples: Vec<String>,
    // virtual chromosome -> cluster keys in creation order
    pub chrom_order: FxHashMap<String,Vec<String>>,
    // cluster key -> cluster
    pub clusters: FxHashMap<String,Cluster>,
    // events which matched a cluster that already held an event of
    // the same sample, e.g. the second mate record of a translocation.
    // They stay in the arena but are no member of any cluster
    pub n_absorbed: u64,
}

impl ClusterEngine {
    pub fn new() -> ClusterEngine {
        ClusterEngine::default()
    }

    /// folds one sample into the table. Samples must be added in the
    /// order in which they shall appear in the report, the order also
    /// decides which cluster wins when an event would fit several
    ///
    /// Unittest: TRUE
    ///
    pub fn add_sample(
        &mut self,
        mut store: EventStore
    ) {
        let sample_idx = self.samples.len();
        self.samples.push(store.sample.clone());
        let chroms : Vec<String> = store.by_chrom.keys().sorted_by(|a, b| compare(a, b)).cloned().collect();
        for v_chrom in chroms {
            let events = store.by_chrom.remove(&v_chrom).unwrap();
            for event in events {
                self.assign(event, sample_idx);
            }
        }
    }

    /// places one event: scan the existing clusters of its virtual
    /// chromosome in creation order and join the first one whose
    /// founding member matches, otherwise found a new cluster keyed
    /// by the own content hash. Clusters founded by the same sample
    /// are skipped in the scan, calls of one sample are never
    /// matched against each other
    fn assign(
        &mut self,
        event: Event,
        sample_idx: usize
    ) {
        let event_idx = self.events.len();
        let mut target : Option<String> = None;
        if let Some(keys) = self.chrom_order.get(&event.virtual_chr) {
            for key in keys {
                let cluster = &self.clusters[key.as_str()];
                let (founder_sample, founder_event) = cluster.members[0];
                if founder_sample == sample_idx {
                    continue;
                }
                if event.matches(&self.events[founder_event]) {
                    target = Some(key.clone());
                    break;
                }
            }
        }
        self.events.push(event);
        self.event_sample.push(sample_idx);
        match target {
            Some(key) => {
                let cluster = self.clusters.get_mut(&key).unwrap();
                if cluster.event_of(sample_idx).is_some() {
                    // the sample reported the same variant more than once
                    debug!("absorbed duplicate call {} of sample {}", self.events[event_idx].locus(), self.samples[sample_idx]);
                    self.n_absorbed += 1;
                }else{
                    cluster.members.push((sample_idx, event_idx));
                }
            },
            None => {
                let key = self.events[event_idx].content_hash();
                if self.clusters.contains_key(&key) {
                    // identical call seen again from the same sample,
                    // typically both mate records of one translocation
                    debug!("absorbed duplicate call {} of sample {}", self.events[event_idx].locus(), self.samples[sample_idx]);
                    self.n_absorbed += 1;
                }else{
                    self.chrom_order.entry(self.events[event_idx].virtual_chr.clone()).or_default().push(key.clone());
                    self.clusters.insert(key.clone(), Cluster {
                        key,
                        members: vec![(sample_idx, event_idx)],
                    });
                }
            },
        }
    }

    /// the virtual chromosomes holding clusters, naturally sorted
    /// so that chr2 comes before chr10
    pub fn sorted_chromosomes(&self) -> Vec<String> {
        self.chrom_order.keys().sorted_by(|a, b| compare(a, b)).cloned().collect()
    }

    /// the cluster keys of one virtual chromosome, ordered by the
    /// chrA position of each cluster's founding member
    pub fn sorted_clusters(
        &self,
        v_chrom: &str
    ) -> Vec<String> {
        match self.chrom_order.get(v_chrom) {
            Some(keys) => keys
                .iter()
                .sorted_by_key(|key| {
                    let founder = self.clusters[key.as_str()].members[0].1;
                    self.events[founder].pos_a
                })
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// the representative member of a cluster: the call with the
    /// highest depth, on equal depth the earlier joined member wins
    ///
    /// Unittest: TRUE
    ///
    pub fn representative(
        &self,
        cluster: &Cluster
    ) -> &Event {
        let mut best = cluster.members[0].1;
        for (_, event_idx) in cluster.members.iter().skip(1) {
            if self.events[*event_idx].depth > self.events[best].depth {
                best = *event_idx;
            }
        }
        &self.events[best]
    }
}


/// the fixed header of the merged vcf. Declares every INFO and
/// FORMAT key which the data lines use and closes with the column
/// line for the single placeholder sample
///
/// Unittest: TRUE
///
pub fn merged_vcf_header(
    version: &str
) -> String {
    let now: DateTime<Local> = Local::now();
    let lines = vec![
        String::from("##fileformat=VCFv4.1"),
        format!("##fileDate={}", now.format("%Y%m%d")),
        format!("##source=mergevcf-{}", version),
        String::from("##INFO=<ID=NS,Number=1,Type=Integer,Description=\"Number of Samples With Data\">"),
        String::from("##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total Depth\">"),
        String::from("##INFO=<ID=AF,Number=A,Type=Float,Description=\"Allele Frequency\">"),
        String::from("##INFO=<ID=SVLEN,Number=1,Type=Integer,Description=\"Length of variant\">"),
        String::from("##INFO=<ID=IMPRECISE,Number=0,Type=Flag,Description=\"Imprecise structural variation\">"),
        String::from("##INFO=<ID=SVTYPE,Number=1,Type=String,Description=\"Type of structural variant\">"),
        String::from("##INFO=<ID=END,Number=1,Type=Integer,Description=\"End position of the variant\">"),
        String::from("##INFO=<ID=CHR2,Number=1,Type=String,Description=\"Chromosome of the second breakpoint\">"),
        String::from("##INFO=<ID=SVMETHOD,Number=1,Type=String,Description=\"Type of approach used to detect SV\">"),
        String::from("##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">"),
        String::from("##FORMAT=<ID=GQ,Number=1,Type=Integer,Description=\"Genotype Quality\">"),
        String::from("##FORMAT=<ID=DP,Number=1,Type=Integer,Description=\"Read Depth\">"),
        String::from("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tdefault"),
    ];
    let mut header = lines.join("\n");
    header.push('\n');
    header
}

/// one data line of the merged vcf, built from the representative
/// of a cluster. QUAL and FILTER are fixed, the second breakpoint
/// goes into END and for inter-chromosomal events into CHR2
///
/// Unittest: TRUE
///
pub fn merged_vcf_line(
    rep: &Event
) -> String {
    let mut info = format!("IMPRECISE;SVTYPE={};END={}", rep.sv_type, rep.pos_b);
    if rep.chr_a != rep.chr_b {
        info.push_str(&format!(";CHR2={}", rep.chr_b));
    }
    if !rep.sv_method().is_empty() {
        info.push_str(&format!(";SVMETHOD={}", rep.sv_method()));
    }
    format!(
        "{}\t{}\t.\t.\t{}\t100\tPASS\t{}\tGT:DP\t1/.:{}",
        rep.chr_a, rep.pos_a, rep.vcf_alt(), info, rep.depth
    )
}

/// the bed track lines of one cluster. Intra-chromosomal events span
/// their interval exactly, inter-chromosomal events get one line per
/// breakpoint flanked by 50 bp each and annotated with the mate
///
/// Unittest: TRUE
///
pub fn merged_bed_rows(
    rep: &Event
) -> Vec<String> {
    let annot = format!("SVTYPE={};DP={};SIZE={}", rep.sv_type, rep.depth, rep.size());
    if rep.chr_a != rep.chr_b {
        vec![
            format!(
                "{}\t{}\t{}\t{};MATE={}:{}",
                rep.chr_a, rep.pos_a.saturating_sub(50), rep.pos_a + 50, annot, rep.chr_b, rep.pos_b
            ),
            format!(
                "{}\t{}\t{}\t{};MATE={}:{}",
                rep.chr_b, rep.pos_b.saturating_sub(50), rep.pos_b + 50, annot, rep.chr_a, rep.pos_a
            ),
        ]
    }else{
        vec![format!("{}\t{}\t{}\t{}", rep.chr_a, rep.pos_a, rep.pos_b, annot)]
    }
}

/// renders all outputs of the merge: the merged vcf, the tab-separated
/// report with one column pair per sample, the bed track of the
/// clusters and the bed track of every single loaded event.
/// Chromosomes are reported in natural order, clusters within one
/// chromosome by the position of their founding member
///
/// Unittest: TRUE
///
pub fn write_merged_reports(
    engine: &ClusterEngine,
    tsv_out: &str,
    bed_out: &str,
    vcf_out: &str,
    regions_out: &str,
    version: &str
) -> Result<(), Box<dyn Error>> {

    let mut vcf_writer = File::create(vcf_out)?;
    let mut bed_writer = File::create(bed_out)?;
    let mut tsv_writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(File::create(tsv_out)?);

    write!(vcf_writer, "{}", merged_vcf_header(version))?;

    let mut header : Vec<String> = ["ChrA", "ChrApos", "ChrB", "ChrBpos", "SVTYPE", "DP", "Size"]
        .iter()
        .map(|x| x.to_string())
        .collect();
    for sample in &engine.samples {
        header.push(sample.clone());
        header.push(String::from("size"));
    }
    tsv_writer.write_record(&header)?;

    for v_chrom in engine.sorted_chromosomes() {
        debug!("reporting virtual chromosome {}", v_chrom);
        for key in engine.sorted_clusters(&v_chrom) {
            let cluster = &engine.clusters[key.as_str()];
            let rep     = engine.representative(cluster);
            writeln!(vcf_writer, "{}", merged_vcf_line(rep))?;
            for row in merged_bed_rows(rep) {
                writeln!(bed_writer, "{}", row)?;
            }
            let mut record : Vec<String> = vec![
                rep.chr_a.clone(),
                rep.pos_a.to_string(),
                rep.chr_b.clone(),
                rep.pos_b.to_string(),
                rep.sv_type.to_string(),
                rep.depth.to_string(),
                rep.size().to_string(),
            ];
            for sample_idx in 0..engine.samples.len() {
                match cluster.event_of(sample_idx) {
                    Some(event_idx) => {
                        let event = &engine.events[event_idx];
                        record.push(event.locus());
                        record.push(event.size().to_string());
                    },
                    None => {
                        record.push(String::new());
                        record.push(String::new());
                    },
                }
            }
            tsv_writer.write_record(&record)?;
        }
    }
    tsv_writer.flush()?;

    // every loaded event in load order, independent of the clustering
    let mut regions_writer = File::create(regions_out)?;
    for event in &engine.events {
        for row in event.region_rows() {
            writeln!(regions_writer, "{}", row)?;
        }
    }
    Ok(())
}


/// adapted from here https://users.rust-lang.org/t/efficient-way-of-checking-if-two-files-have-the-same-content/74735
/// very useful for tests with external files and to verify that the results is identical
/// to a previously manually generated result file
pub fn is_same_file(
    file1: &Path,
    file2: &Path
) -> Result<bool, std::io::Error> {
    println!("INFO: comparing file1 {:?} and file2 with each other {:?}", file1.to_str(), file2.to_str());
    let f1 = File::open(file1).expect("ERROR: could not open file");
    let f2 = File::open(file2).expect("ERROR: could not open file");

    // Use buf readers since they are much faster
    let f1r = BufReader::new(f1);
    let f2r = BufReader::new(f2);

    // Do a byte to byte comparison of the two files
    for (b1, b2) in f1r.bytes().zip(f2r.bytes()) {
        if b1.unwrap() != b2.unwrap() {
            return Ok(false);
        }
    }
   Ok(true)
}
