use super::centroid::SpectralCentroid;
use super::dissonance::Dissonance;
use super::loudness::Loudness;
use super::onset::OnsetHfc;
use super::pitch::Pitch;
use super::{AlgorithmConfig, AlgorithmKind, AnalysisError, FeatureAlgorithm};

type Constructor = fn(&AlgorithmConfig) -> Result<Box<dyn FeatureAlgorithm>, AnalysisError>;

/// One row of the factory table: how to build a feature and which ports it
/// exposes.
pub struct AlgorithmDescriptor {
    pub kind: AlgorithmKind,
    /// Name of the port the band buffer is bound to.
    pub input_port: &'static str,
    /// Name of the scalar port latched into the slot output.
    pub output_port: &'static str,
    /// Nominal output range, advertised with the slot's signal.
    pub range: (f32, f32),
    construct: Constructor,
}

impl AlgorithmDescriptor {
    pub fn construct(&self, config: &AlgorithmConfig) -> Result<Box<dyn FeatureAlgorithm>, AnalysisError> {
        (self.construct)(config)
    }
}

fn boxed<A: FeatureAlgorithm + 'static>(
    algorithm: Result<A, AnalysisError>,
) -> Result<Box<dyn FeatureAlgorithm>, AnalysisError> {
    algorithm.map(|a| Box::new(a) as Box<dyn FeatureAlgorithm>)
}

fn loudness(c: &AlgorithmConfig) -> Result<Box<dyn FeatureAlgorithm>, AnalysisError> {
    boxed(Loudness::new(c))
}

fn spectral_centroid(c: &AlgorithmConfig) -> Result<Box<dyn FeatureAlgorithm>, AnalysisError> {
    boxed(SpectralCentroid::new(c))
}

fn pitch(c: &AlgorithmConfig) -> Result<Box<dyn FeatureAlgorithm>, AnalysisError> {
    boxed(Pitch::new(c))
}

fn onset(c: &AlgorithmConfig) -> Result<Box<dyn FeatureAlgorithm>, AnalysisError> {
    boxed(OnsetHfc::new(c))
}

fn dissonance(c: &AlgorithmConfig) -> Result<Box<dyn FeatureAlgorithm>, AnalysisError> {
    boxed(Dissonance::new(c))
}

static DESCRIPTORS: [AlgorithmDescriptor; 5] = [
    AlgorithmDescriptor {
        kind: AlgorithmKind::Loudness,
        input_port: "signal",
        output_port: "loudness",
        range: (0.0, 1000.0),
        construct: loudness,
    },
    AlgorithmDescriptor {
        kind: AlgorithmKind::SpectralCentroid,
        input_port: "array",
        output_port: "centroid",
        range: (0.0, 22050.0),
        construct: spectral_centroid,
    },
    AlgorithmDescriptor {
        kind: AlgorithmKind::Pitch,
        input_port: "signal",
        output_port: "pitch",
        range: (0.0, 5000.0),
        construct: pitch,
    },
    AlgorithmDescriptor {
        kind: AlgorithmKind::Onset,
        input_port: "signal",
        output_port: "onsetDetection",
        range: (0.0, 1000.0),
        construct: onset,
    },
    AlgorithmDescriptor {
        kind: AlgorithmKind::Dissonance,
        input_port: "signal",
        output_port: "dissonance",
        range: (0.0, 1.0),
        construct: dissonance,
    },
];

/// Builds feature algorithms for a fixed sample rate and frame size.
///
/// Owned by the slot bank and replaced whenever the host re-prepares.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlgorithmFactory {
    config: AlgorithmConfig,
}

impl AlgorithmFactory {
    pub fn new(config: AlgorithmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AlgorithmConfig {
        &self.config
    }

    pub fn descriptor(kind: AlgorithmKind) -> Option<&'static AlgorithmDescriptor> {
        DESCRIPTORS.iter().find(|d| d.kind == kind)
    }

    /// Build a fresh instance of `kind`. `AlgorithmKind::None` yields
    /// `Ok(None)`.
    pub fn create(&self, kind: AlgorithmKind) -> Result<Option<Box<dyn FeatureAlgorithm>>, AnalysisError> {
        match Self::descriptor(kind) {
            Some(descriptor) => descriptor.construct(&self.config).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_but_none_has_a_descriptor() {
        for kind in AlgorithmKind::ALL {
            assert_eq!(AlgorithmFactory::descriptor(kind).is_some(), !kind.is_none());
        }
    }

    #[test]
    fn test_create_builds_requested_kind() {
        let factory = AlgorithmFactory::new(AlgorithmConfig::new(48000.0, 512));
        for kind in AlgorithmKind::ALL {
            let built = factory.create(kind).unwrap();
            match built {
                Some(algorithm) => assert_eq!(algorithm.kind(), kind),
                None => assert!(kind.is_none()),
            }
        }
    }

    #[test]
    fn test_create_propagates_construction_errors() {
        let factory = AlgorithmFactory::new(AlgorithmConfig::new(48000.0, 16));
        assert!(factory.create(AlgorithmKind::Loudness).is_ok());
        assert!(factory.create(AlgorithmKind::Pitch).is_err());

        let factory = AlgorithmFactory::new(AlgorithmConfig::new(500.0, 512));
        assert!(factory.create(AlgorithmKind::Loudness).is_err());
    }
}
