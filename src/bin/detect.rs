extern crate rand;
extern crate roifinder;

use std::fs::File;

use roifinder::dataset::{self, DatasetSettings, Grid};
use roifinder::network::{Network, NetworkSettings};
use roifinder::output::{self, DatasetRegions};
use roifinder::sampler::{SamplerSettings, TrainingSampler};
use roifinder::sweep::{self, SweepSettings};
use roifinder::trainer::{Logging, Trainer};

// A scaled-down configuration so the demonstration finishes quickly. The
// full-size pipeline uses NetworkSettings::neurofinder() over 512x512 frames.
const FRAME: usize = 64;
const WINDOW: usize = 16;
const TARGET: usize = 8;
const BLOBS: usize = 6;
const BLOB_RADIUS: f64 = 2.5;

/// Generates one synthetic summary image: a handful of Gaussian cell bodies
/// on a noisy background, with the matching binary mask.
fn generate_frame<R: rand::Rng>(rng: &mut R) -> (Grid, Grid) {
    use rand::distributions::{IndependentSample, Normal, Range};
    let position = Range::new(WINDOW, FRAME - WINDOW);
    let noise = Normal::new(0.0, 0.05);

    let mut image = Grid::zeros(FRAME, FRAME);
    let mut mask = Grid::zeros(FRAME, FRAME);
    for _ in 0..BLOBS {
        let cy = position.ind_sample(rng) as f64;
        let cx = position.ind_sample(rng) as f64;
        for r in 0..FRAME {
            for c in 0..FRAME {
                let d2 = (r as f64 - cy).powi(2) + (c as f64 - cx).powi(2);
                let glow = (-d2 / (2.0 * BLOB_RADIUS * BLOB_RADIUS)).exp();
                image.set(r, c, image.get(r, c) + glow);
                if d2 <= BLOB_RADIUS * BLOB_RADIUS {
                    mask.set(r, c, 1.0);
                }
            }
        }
    }
    for r in 0..FRAME {
        for c in 0..FRAME {
            image.set(r, c, image.get(r, c) + noise.ind_sample(rng));
        }
    }
    (image, mask)
}

fn main() {
    let mut rng = rand::thread_rng();
    let (train_image, train_mask) = generate_frame(&mut rng);
    let (second_image, second_mask) = generate_frame(&mut rng);
    let (test_image, _) = generate_frame(&mut rng);

    let frames = DatasetSettings {
        canonical: FRAME,
        margin: WINDOW / 2,
    };
    let data = dataset::prepare(vec![train_image, second_image],
                                vec![train_mask, second_mask],
                                vec![test_image],
                                &frames)
        .unwrap();

    let mut network = Network::new(NetworkSettings {
            conv_maps: vec![1, 8, 8, 16],
            filter_shapes: vec![(3, 3); 3],
            pool_layer: Some(1),
            hidden_nodes: vec![64],
            input_window: WINDOW,
            target_window: TARGET,
            learning_rate: 0.005,
        })
        .unwrap();
    let mut sampler = TrainingSampler::new(data.train_images,
                                           data.train_masks,
                                           SamplerSettings {
                                               input_window: WINDOW,
                                               target_window: TARGET,
                                               negative_margin: WINDOW / 2,
                                           },
                                           rand::thread_rng())
        .unwrap();

    Trainer::new()
        .steps(1_500)
        .batch_size(20)
        .logging(Logging::Iterations(100))
        .run(&mut network, &mut sampler)
        .unwrap();

    let settings = SweepSettings::new();
    let mut results = Vec::new();
    for (i, image) in data.test_images.iter().enumerate() {
        settings.logging.sweep_image(i, data.test_images.len());
        let regions = sweep::detect(&network, image, &settings).unwrap();
        println!("found {} regions", regions.len());
        results.push(DatasetRegions {
            dataset: format!("synthetic.00.{:02}", i),
            regions: regions,
        });
    }

    let file = File::create("submission.json").unwrap();
    output::write_submission(file, &results).unwrap();
    println!("wrote submission.json");
}
