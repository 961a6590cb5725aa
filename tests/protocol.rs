//! End-to-end protocol tests: VCF to frequency report through real BFV.

use std::io::Cursor;
use std::sync::Arc;

use genopool::adapters::files;
use genopool::adapters::{BfvAdapter, VcfReader};
use genopool::application::{
    AggregationError, AggregationReference, AggregationService, ContextManager,
    ContributorService, InterpretationService, SecretExport,
};
use genopool::domain::{
    encode, AliasPolicy, AlleleFrequency, CiphertextVector, ContextParameters, CryptoError,
    DisclosurePolicy, GenotypeVector, PanelCatalogue, Passphrase, PrivateContext, PublicContext,
    VariantId, VariantRecord, VariantSchema, VariantSpec,
};
use genopool::ports::GenomeSource;

struct Campaign {
    engine: Arc<BfvAdapter>,
    public: PublicContext,
    private: PrivateContext,
    schema: VariantSchema,
}

impl Campaign {
    fn new(schema: VariantSchema) -> Self {
        let engine = Arc::new(BfvAdapter::new());
        let (public, private) = ContextManager::new(Arc::clone(&engine))
            .generate(&ContextParameters::default())
            .unwrap();
        Self {
            engine,
            public,
            private,
            schema,
        }
    }

    fn three_variants() -> Self {
        Self::new(
            VariantSchema::define(
                "trio",
                vec![
                    VariantSpec::new(VariantId::named("rs1")),
                    VariantSpec::new(VariantId::named("rs2")),
                    VariantSpec::new(VariantId::named("rs3")),
                ],
                AliasPolicy::Strict,
            )
            .unwrap(),
        )
    }

    fn contributor(&self) -> ContributorService<BfvAdapter> {
        ContributorService::new(Arc::clone(&self.engine))
    }

    fn contribute_vcf(&self, vcf: &'static str) -> CiphertextVector {
        let mut source = VcfReader::from_reader(Cursor::new(vcf));
        self.contributor()
            .contribute(&mut source, &self.schema, &self.public)
            .unwrap()
    }

    fn contribute(&self, dosages: &[u8]) -> CiphertextVector {
        let vector = GenotypeVector::from_dosages(dosages.to_vec(), &self.schema).unwrap();
        self.contributor().encrypt(&vector, &self.public).unwrap()
    }

    fn aggregator(&self) -> AggregationService<BfvAdapter> {
        AggregationService::new(Arc::clone(&self.engine), &self.public).unwrap()
    }

    fn reference(&self) -> AggregationReference {
        AggregationReference::new(&self.schema, &self.public)
    }

    fn key_holder(&self) -> InterpretationService<BfvAdapter> {
        InterpretationService::new(Arc::clone(&self.engine), DisclosurePolicy::default())
    }
}

fn record(id: &str, gt: &str) -> VariantRecord {
    VariantRecord {
        id: Some(id.to_string()),
        chrom: "1".into(),
        pos: 1,
        alts: vec!["A".into()],
        genotype: genopool::domain::Genotype::parse(gt),
    }
}

#[test]
fn two_contributors_give_expected_frequencies() {
    let campaign = Campaign::three_variants();

    let a = campaign.contribute_vcf(
        "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS\n\
         1\t10\trs1\tA\tG\t.\t.\t.\tGT\t0/0\n\
         1\t20\trs2\tC\tT\t.\t.\t.\tGT\t0/1\n\
         1\t30\trs3\tG\tA\t.\t.\t.\tGT\t1/1\n",
    );
    let b = campaign.contribute_vcf(
        "1\t10\trs1\tA\tG\t.\t.\t.\tGT\t0|1\n\
         1\t20\trs2\tC\tT\t.\t.\t.\tGT\t1|0\n",
    );

    let sum = campaign
        .aggregator()
        .aggregate(&[a, b], &campaign.reference())
        .unwrap();
    let service = campaign.key_holder();
    let result = service.decrypt(&sum, &campaign.private).unwrap();
    assert_eq!(result.counts, vec![1, 2, 2]);
    assert_eq!(result.contributor_count, 2);

    let report = service.interpret(&result, &campaign.schema).unwrap();
    assert_eq!(
        report.frequencies(),
        vec![
            AlleleFrequency::Defined(0.25),
            AlleleFrequency::Defined(0.5),
            AlleleFrequency::Defined(0.5),
        ]
    );
}

#[test]
fn sums_are_exact() {
    let campaign = Campaign::three_variants();
    let rows: Vec<[u8; 3]> = (0..12u8).map(|i| [i % 3, (i / 3) % 3, (i * 7) % 3]).collect();

    let inputs: Vec<CiphertextVector> = rows.iter().map(|r| campaign.contribute(r)).collect();
    let sum = campaign
        .aggregator()
        .aggregate_parallel(&inputs, &campaign.reference())
        .unwrap();
    let result = campaign
        .key_holder()
        .decrypt(&sum, &campaign.private)
        .unwrap();

    for slot in 0..3 {
        let expected: u64 = rows.iter().map(|r| u64::from(r[slot])).sum();
        assert_eq!(result.counts[slot], expected, "slot {slot}");
    }
    assert_eq!(result.contributor_count, 12);
}

#[test]
fn aggregation_is_order_independent() {
    let campaign = Campaign::three_variants();
    let inputs = vec![
        campaign.contribute(&[2, 0, 1]),
        campaign.contribute(&[0, 0, 2]),
        campaign.contribute(&[1, 1, 1]),
    ];
    let mut reversed = inputs.clone();
    reversed.reverse();
    let rotated = vec![inputs[1].clone(), inputs[2].clone(), inputs[0].clone()];

    let aggregator = campaign.aggregator();
    let reference = campaign.reference();
    let key_holder = campaign.key_holder();
    let open = |inputs: &[CiphertextVector]| {
        let sum = aggregator.aggregate(inputs, &reference).unwrap();
        key_holder.decrypt(&sum, &campaign.private).unwrap()
    };

    let expected = open(&inputs[..]);
    assert_eq!(expected.counts, vec![3, 1, 4]);
    assert_eq!(open(&reversed[..]), expected);
    assert_eq!(open(&rotated[..]), expected);
}

#[test]
fn single_contributor_frequencies_are_half_dosage() {
    let campaign = Campaign::three_variants();
    let only = campaign.contribute(&[0, 1, 2]);

    let sum = campaign
        .aggregator()
        .aggregate(std::slice::from_ref(&only), &campaign.reference())
        .unwrap();
    let report = campaign
        .key_holder()
        .release(&sum, &campaign.private, &campaign.schema)
        .unwrap();

    assert_eq!(report.contributor_count, 1);
    assert_eq!(
        report.frequencies(),
        vec![
            AlleleFrequency::Defined(0.0),
            AlleleFrequency::Defined(0.5),
            AlleleFrequency::Defined(1.0),
        ]
    );
}

#[test]
fn empty_aggregation_is_an_error() {
    let campaign = Campaign::three_variants();
    let err = campaign
        .aggregator()
        .aggregate(&[], &campaign.reference())
        .unwrap_err();
    assert_eq!(err, AggregationError::Empty);
}

#[test]
fn encoding_is_deterministic_and_total() {
    let campaign = Campaign::three_variants();
    let records = vec![
        record("rs3", "0/1"),
        record("rs99", "1/1"),
        record("rs1", "./."),
    ];

    let first = encode(records.clone(), &campaign.schema).unwrap();
    let second = encode(records, &campaign.schema).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.dosages(), &[0, 0, 1]);
    assert_eq!(first.len(), campaign.schema.len());
}

#[test]
fn schema_mismatch_names_the_contribution() {
    let campaign = Campaign::three_variants();
    let other_schema = VariantSchema::define(
        "trio",
        vec![
            VariantSpec::new(VariantId::named("rs1")),
            VariantSpec::new(VariantId::named("rs3")),
            VariantSpec::new(VariantId::named("rs2")),
        ],
        AliasPolicy::Strict,
    )
    .unwrap();
    assert_ne!(other_schema.version(), campaign.schema.version());

    let foreign = {
        let vector = GenotypeVector::from_dosages(vec![1, 1, 1], &other_schema).unwrap();
        campaign.contributor().encrypt(&vector, &campaign.public).unwrap()
    };
    let inputs = [
        campaign.contribute(&[0, 0, 0]),
        campaign.contribute(&[1, 0, 0]),
        foreign,
    ];
    let err = campaign
        .aggregator()
        .aggregate(&inputs, &campaign.reference())
        .unwrap_err();
    assert!(matches!(
        err,
        AggregationError::SchemaVersionMismatch { index: 2, .. }
    ));
}

#[test]
fn wrong_key_cannot_decrypt() {
    let campaign = Campaign::three_variants();
    let other = Campaign::three_variants();

    let sum = campaign
        .aggregator()
        .aggregate(&[campaign.contribute(&[1, 2, 0])], &campaign.reference())
        .unwrap();
    assert!(matches!(
        campaign.key_holder().decrypt(&sum, &other.private),
        Err(CryptoError::Decryption(_))
    ));
}

#[test]
fn contexts_survive_the_filesystem() {
    let campaign = Campaign::three_variants();
    let manager = ContextManager::new(Arc::clone(&campaign.engine));
    let dir = tempfile::tempdir().unwrap();

    let public_path = dir.path().join("public.ctx");
    let private_path = dir.path().join("private.ctx");
    files::write_blob(
        &public_path,
        &manager.serialize_public(&campaign.public).unwrap(),
        files::Sensitivity::Public,
    )
    .unwrap();
    files::write_blob(
        &private_path,
        &manager
            .serialize_private(&campaign.private, SecretExport::IncludeSecret)
            .unwrap(),
        files::Sensitivity::Secret,
    )
    .unwrap();

    let public = manager
        .deserialize_public(&files::read_blob(&public_path).unwrap())
        .unwrap();
    let private = manager
        .deserialize_private(&files::read_blob(&private_path).unwrap())
        .unwrap();
    assert!(manager
        .deserialize_private(&files::read_blob(&public_path).unwrap())
        .is_err());

    // A contribution encrypted under the reloaded public context opens with
    // the reloaded private one, and travels through an envelope file.
    let vector = GenotypeVector::from_dosages(vec![2, 1, 0], &campaign.schema).unwrap();
    let ct = campaign.contributor().encrypt(&vector, &public).unwrap();
    let ct_path = dir.path().join("contribution.json");
    files::write_ciphertext(&ct_path, &ct).unwrap();
    let ct = files::read_ciphertext(&ct_path).unwrap();

    let result = campaign.key_holder().decrypt(&ct, &private).unwrap();
    assert_eq!(result.counts, vec![2, 1, 0]);
    assert_eq!(result.contributor_count, 1);
}

#[test]
fn sealed_private_context_opens_the_sum() {
    let campaign = Campaign::three_variants();
    let manager = ContextManager::new(Arc::clone(&campaign.engine));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("private.ctx");
    let passphrase = Passphrase::new("key holder only").unwrap();

    let serialized = manager
        .serialize_private(&campaign.private, SecretExport::IncludeSecret)
        .unwrap();
    files::write_private_context(&path, &serialized, Some(&passphrase)).unwrap();
    assert!(manager
        .deserialize_private(&files::read_blob(&path).unwrap())
        .is_err());

    let bytes = files::read_private_context(&path, Some(&passphrase)).unwrap();
    let private = manager.deserialize_private(&bytes).unwrap();
    let sum = campaign
        .aggregator()
        .aggregate(&[campaign.contribute(&[2, 0, 1])], &campaign.reference())
        .unwrap();
    let result = campaign.key_holder().decrypt(&sum, &private).unwrap();
    assert_eq!(result.counts, vec![2, 0, 1]);
}

#[test]
fn builtin_panel_unifies_coordinates() {
    let catalogue = PanelCatalogue::builtin().unwrap();
    let panel = catalogue.get("alzheimers").unwrap();
    let schema = &panel.schema;

    // rs429358 reported only by coordinate, rs7412 by rsID.
    let vcf = "19\t44908684\t.\tT\tC\t.\tPASS\t.\tGT\t0/1\n\
               19\t44908822\trs7412\tC\tT\t.\tPASS\t.\tGT\t1/1\n";
    let records = VcfReader::from_reader(Cursor::new(vcf))
        .read_records()
        .unwrap();
    let vector = encode(records, schema).unwrap();

    let slot_4358 = schema.lookup(&VariantId::named("rs429358")).unwrap();
    let slot_7412 = schema.lookup(&VariantId::named("rs7412")).unwrap();
    assert_eq!(vector.dosages()[slot_4358], 1);
    assert_eq!(vector.dosages()[slot_7412], 2);
    assert_eq!(vector.dosages().iter().map(|&d| u32::from(d)).sum::<u32>(), 3);
}
