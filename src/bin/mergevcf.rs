//! ## mergevcf ##
//! ---------------------
//! This tool expects a list of vcf files with structural variant calls and
//! merges them into one consensus set. Calls of different samples which
//! describe the same event are clustered on their centerpoint distance and
//! reported once, together with the call of every supporting sample.
use clap::{app_from_crate,crate_name,crate_description,crate_authors,crate_version,Arg};
use std::process;

// our library which is within the same project
extern crate svtools;
use svtools::lib::hts_lib_based::{*};
use svtools::lib::common::{*};

extern crate pretty_env_logger;
#[macro_use] extern crate log;


fn main() {
    pretty_env_logger::init();

    let flanking_default = DEFAULT_FLANKING.to_string();
    let matches = app_from_crate!()
    .about("This tool merges structural variant events from 2 or more vcf files into one consensus set. \
        Breakpoint pairs are matched over all samples based on the distance of their centerpoints and \
        matching events are reported as one consensus event together with every supporting call. \n\
        The program produces a tab-separated summary, a merged vcf, a bed track of the consensus \
        events and a bed track of every region that was seen in the input.")
    .arg(Arg::with_name("VCF")
            .short("i")
            .long("vcf")
            .value_name("FILE")
            .help("The VCF(s) to compare, can be supplied multiple times")
            .takes_value(true)
            .multiple(true)
            .required(false))
    .arg(Arg::with_name("EXCLUSION")
            .short("c")
            .long("exclusion_regions")
            .value_name("FILE")
            .help("Exclusion regions file in BED format")
            .takes_value(true)
            .multiple(true)
            .required(false))
    .arg(Arg::with_name("FLANKING")
            .short("f")
            .long("flanking")
            .value_name("int")
            .help("Centerpoint flanking [100]")
            .takes_value(true)
            .required(false)
            .default_value(&flanking_default))
    .arg(Arg::with_name("TRANSONLY")
            .short("t")
            .long("translocation_only")
            .help("Do translocations only")
            .takes_value(false)
            .required(false))
    .arg(Arg::with_name("OUTPUT")
            .short("o")
            .long("output")
            .value_name("FILE")
            .help("Output summary to [sample.tsv]")
            .takes_value(true)
            .required(false)
            .default_value("sample.tsv"))
    .arg(Arg::with_name("BEDOUTPUT")
            .short("b")
            .long("bedoutput")
            .value_name("FILE")
            .help("Output bed file to [sample.bed]")
            .takes_value(true)
            .required(false)
            .default_value("sample.bed"))
    .arg(Arg::with_name("VCFOUTPUT")
            .short("v")
            .long("vcfoutput")
            .value_name("FILE")
            .help("Output summary to [sample.vcf]")
            .takes_value(true)
            .required(false)
            .default_value("sample.vcf"))
    .arg(Arg::with_name("REGIONSOUT")
            .short("r")
            .long("regions_out")
            .value_name("FILE")
            .help("Output all regions to [regions_out.bed]")
            .takes_value(true)
            .required(false)
            .default_value("regions_out.bed"))
    .get_matches();

    let vcf_files : Vec<String> = match matches.values_of("VCF") {
        Some(files) => files.map(String::from).collect(),
        None => Vec::new(),
    };
    let exclusion_files : Vec<String> = match matches.values_of("EXCLUSION") {
        Some(files) => files.map(String::from).collect(),
        None => Vec::new(),
    };
    let flanking    = matches.value_of("FLANKING").unwrap().parse::<u64>().expect("ERROR: flanking must be a positive integer!");
    let trans_only  = matches.is_present("TRANSONLY");
    let tsv_out     = matches.value_of("OUTPUT").unwrap();
    let bed_out     = matches.value_of("BEDOUTPUT").unwrap();
    let vcf_out     = matches.value_of("VCFOUTPUT").unwrap();
    let regions_out = matches.value_of("REGIONSOUT").unwrap();

    if vcf_files.len() < 2 {
        error!("Please supply at least 2 VCF files to merge");
        process::exit(1);
    }
    debug!("merging samples: {:?}", vcf_files);

    run_merge(
        &vcf_files,
        &exclusion_files,
        flanking,
        trans_only,
        tsv_out,
        bed_out,
        vcf_out,
        regions_out,
        crate_version!(),
    ).expect("ERROR: could not write the merged reports!");
}


#[cfg(test)]
mod tests {
    // Note this useful idiom: importing names from outer (for mod tests) scope.
    use super::*;
    use std::fs;
    use std::io::Write as IoWrite;
    use std::path::{Path,PathBuf};
    use tempfile::tempdir;

    // fixture files carry fixed names so that the sample columns
    // of the summary are predictable
    fn write_test_vcf(dir: &Path, name: &str, records: &[&str]) -> String {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).expect("ERROR: could not create fixture!");
        let header = "##fileformat=VCFv4.2\n\
            ##contig=<ID=chr1>\n\
            ##contig=<ID=chr2>\n\
            ##contig=<ID=chr3>\n\
            ##contig=<ID=chr8>\n\
            ##INFO=<ID=SVTYPE,Number=1,Type=String,Description=\"SV type\">\n\
            ##INFO=<ID=END,Number=1,Type=Integer,Description=\"SV end\">\n\
            ##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Read depth\">\n\
            ##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n\
            #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tdefault\n";
        write!(file, "{}", header).expect("ERROR: could not write fixture header!");
        for record in records {
            writeln!(file, "{}", record).expect("ERROR: could not write fixture record!");
        }
        path.to_str().unwrap().to_string()
    }

    fn two_sample_fixtures(dir: &Path) -> (String, String) {
        let s1 = write_test_vcf(dir, "s1.vcf", &[
            "chr1\t1100\t.\tN\t<DEL>\t.\tPASS\tSVTYPE=DEL;END=1200;DP=30\tGT\t0/1",
            "chr3\t500\t.\tN\tN[chr8:2000[\t.\tPASS\tSVTYPE=CTX;DP=20\tGT\t0/1",
        ]);
        let s2 = write_test_vcf(dir, "s2.vcf", &[
            "chr1\t1150\t.\tN\t<DEL>\t.\tPASS\tSVTYPE=DEL;END=1250;DP=60\tGT\t0/1",
            "chr2\t700\t.\tN\t<DEL>\t.\tPASS\tSVTYPE=DEL;END=900;DP=10\tGT\t0/1",
            "chr8\t2050\t.\tN\tN[chr3:450[\t.\tPASS\tSVTYPE=CTX;DP=5\tGT\t0/1",
        ]);
        (s1, s2)
    }

    fn out_paths(dir: &Path) -> (PathBuf, PathBuf, PathBuf, PathBuf) {
        (
            dir.join("merged.tsv"),
            dir.join("merged.bed"),
            dir.join("merged.vcf"),
            dir.join("regions.bed"),
        )
    }

    #[test]
    fn merges_two_callsets() {
        let dir = tempdir().expect("ERROR: could not create temp dir!");
        let (s1, s2) = two_sample_fixtures(dir.path());
        let (tsv, bed, vcf, regions) = out_paths(dir.path());
        run_merge(
            &[s1, s2],
            &[],
            100,
            false,
            tsv.to_str().unwrap(),
            bed.to_str().unwrap(),
            vcf.to_str().unwrap(),
            regions.to_str().unwrap(),
            "0.1.3",
        ).expect("ERROR: merge failed!");

        let tsv_text = fs::read_to_string(&tsv).unwrap();
        let lines : Vec<&str> = tsv_text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "ChrA\tChrApos\tChrB\tChrBpos\tSVTYPE\tDP\tSize\ts1.vcf\tsize\ts2.vcf\tsize");
        assert_eq!(lines[1], "chr1\t1150\tchr1\t1250\tDEL\t60\t100\tchr1:1100-1200\t100\tchr1:1150-1250\t100");
        assert_eq!(lines[2], "chr2\t700\tchr2\t900\tDEL\t10\t200\t\t\tchr2:700-900\t200");
        assert_eq!(lines[3], "chr3\t500\tchr8\t2000\tCTX\t20\t1500\tchr3:500-chr8:2000\t1500\tchr3:450-chr8:2050\t1600");

        let vcf_text = fs::read_to_string(&vcf).unwrap();
        assert!(vcf_text.starts_with("##fileformat=VCFv4.1\n"));
        assert!(vcf_text.contains("##source=mergevcf-0.1.3\n"));
        assert!(vcf_text.contains("\nchr1\t1150\t.\t.\t.\t100\tPASS\tIMPRECISE;SVTYPE=DEL;END=1250\tGT:DP\t1/.:60\n"));
        assert!(vcf_text.contains("\nchr2\t700\t.\t.\t.\t100\tPASS\tIMPRECISE;SVTYPE=DEL;END=900\tGT:DP\t1/.:10\n"));
        assert!(vcf_text.contains("\nchr3\t500\t.\t.\tN[chr8:2000[\t100\tPASS\tIMPRECISE;SVTYPE=CTX;END=2000;CHR2=chr8\tGT:DP\t1/.:20\n"));

        let bed_text = fs::read_to_string(&bed).unwrap();
        let bed_lines : Vec<&str> = bed_text.lines().collect();
        assert_eq!(bed_lines, vec![
            "chr1\t1150\t1250\tSVTYPE=DEL;DP=60;SIZE=100",
            "chr2\t700\t900\tSVTYPE=DEL;DP=10;SIZE=200",
            "chr3\t450\t550\tSVTYPE=CTX;DP=20;SIZE=1500;MATE=chr8:2000",
            "chr8\t1950\t2050\tSVTYPE=CTX;DP=20;SIZE=1500;MATE=chr3:500",
        ]);

        let regions_text = fs::read_to_string(&regions).unwrap();
        let region_lines : Vec<&str> = regions_text.lines().collect();
        assert_eq!(region_lines, vec![
            "chr1\t1100\t1200\tindel",
            "chr3\t500\t600\tctx",
            "chr8\t2000\t2100\tctx",
            "chr1\t1150\t1250\tindel",
            "chr2\t700\t900\tindel",
            "chr3\t450\t550\tctx",
            "chr8\t2050\t2150\tctx",
        ]);
    }

    #[test]
    fn translocations_only_run() {
        let dir = tempdir().expect("ERROR: could not create temp dir!");
        let (s1, s2) = two_sample_fixtures(dir.path());
        let (tsv, bed, vcf, regions) = out_paths(dir.path());
        run_merge(
            &[s1, s2],
            &[],
            100,
            true,
            tsv.to_str().unwrap(),
            bed.to_str().unwrap(),
            vcf.to_str().unwrap(),
            regions.to_str().unwrap(),
            "0.1.3",
        ).expect("ERROR: merge failed!");
        let tsv_text = fs::read_to_string(&tsv).unwrap();
        let lines : Vec<&str> = tsv_text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "chr3\t500\tchr8\t2000\tCTX\t20\t1500\tchr3:500-chr8:2000\t1500\tchr3:450-chr8:2050\t1600");
    }

    #[test]
    fn repeated_runs_are_identical() {
        let dir = tempdir().expect("ERROR: could not create temp dir!");
        let (s1, s2) = two_sample_fixtures(dir.path());
        let run_a = dir.path().join("a");
        let run_b = dir.path().join("b");
        fs::create_dir(&run_a).unwrap();
        fs::create_dir(&run_b).unwrap();
        for run in [&run_a, &run_b] {
            let (tsv, bed, vcf, regions) = out_paths(run);
            run_merge(
                &[s1.clone(), s2.clone()],
                &[],
                100,
                false,
                tsv.to_str().unwrap(),
                bed.to_str().unwrap(),
                vcf.to_str().unwrap(),
                regions.to_str().unwrap(),
                "0.1.3",
            ).expect("ERROR: merge failed!");
        }
        let (a_tsv, a_bed, a_vcf, a_regions) = out_paths(&run_a);
        let (b_tsv, b_bed, b_vcf, b_regions) = out_paths(&run_b);
        assert!(is_same_file(&a_tsv, &b_tsv).unwrap());
        assert!(is_same_file(&a_bed, &b_bed).unwrap());
        assert!(is_same_file(&a_vcf, &b_vcf).unwrap());
        assert!(is_same_file(&a_regions, &b_regions).unwrap());
    }
}
