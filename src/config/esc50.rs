use crate::feature::MelSpectrogramConfig;
use crate::lr::OneCycleConfig;
use crate::mask::SpecAugmentConfig;
use crate::mixup::MixupConfig;
use crate::model::AudioCnnConfig;
use crate::train::TrainingConfig;

/// The fixed ESC-50 recipe. Only the class count depends on the data.
pub fn esc50_config(num_classes: usize) -> TrainingConfig {
    let mel = MelSpectrogramConfig {
        sample_rate: 44_100,
        n_fft: 1024,
        hop_length: 512,
        n_mels: 128,
        f_min: 0.0,
        f_max: 11_025.0,
    };

    let augment = SpecAugmentConfig {
        freq_mask_param: 30,
        time_mask_param: 80,
        mask_value: 0.0,
    };

    let schedule = OneCycleConfig {
        max_lr: 0.002,
        pct_start: 0.1,
        div_factor: 25.0,
        final_div_factor: 1e4,
    };

    TrainingConfig::new(AudioCnnConfig::new(num_classes))
        .with_mel(mel)
        .with_augment(augment)
        .with_mixup(MixupConfig { prob: 0.3, alpha: 0.2 })
        .with_schedule(schedule)
        .with_num_epochs(100)
        .with_batch_size(32)
        .with_learning_rate(0.005)
        .with_weight_decay(0.01)
        .with_label_smoothing(0.1)
        .with_seed(42)
}

#[test]
fn test_recipe_matches_defaults() {
    let config = esc50_config(50);

    assert_eq!(config.model.num_classes, 50);
    assert_eq!(config.num_epochs, 100);
    assert_eq!(config.batch_size, 32);
    assert_eq!(config.seed, 42);
    assert_eq!(config.mel.n_mels, MelSpectrogramConfig::new().n_mels);
    assert_eq!(config.schedule.max_lr, OneCycleConfig::new().max_lr);
}
