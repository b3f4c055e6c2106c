use criterion::{black_box, criterion_group, criterion_main, Criterion};
use meercal::{CasaScript, PipelineConfig, PipelineConfigBuilder, Plan};

fn get_config_rounds(rounds: u8) -> PipelineConfig {
    let mut config = PipelineConfigBuilder::default()
        .ms("1562400000.ms")
        .target_ms("1562400000_target.ms")
        .build()
        .unwrap();
    config.selfcal.rounds = rounds;
    config
}

fn bench_plan_build(crt: &mut Criterion) {
    for rounds in [1, 4] {
        let config = get_config_rounds(rounds);
        crt.bench_function(
            format!("plan_build - {} selfcal rounds", rounds).as_str(),
            |bch| {
                bch.iter(|| Plan::build(black_box(&config)).unwrap());
            },
        );
    }
}

fn bench_plan_validate(crt: &mut Criterion) {
    let plan = Plan::build(&get_config_rounds(4)).unwrap();
    crt.bench_function("plan_validate - 4 selfcal rounds", |bch| {
        bch.iter(|| black_box(&plan).validate().unwrap());
    });
}

fn bench_script_render(crt: &mut Criterion) {
    let plan = Plan::build(&get_config_rounds(1)).unwrap();
    crt.bench_function(
        format!("script_render - {} steps", plan.steps.len()).as_str(),
        |bch| {
            bch.iter(|| CasaScript::render_plan(black_box(&plan)));
        },
    );
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(10);
    targets =
        bench_plan_build,
        bench_plan_validate,
        bench_script_render,
);
criterion_main!(benches);
