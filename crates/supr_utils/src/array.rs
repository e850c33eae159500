use ndarray as nd;
use ndarray::s;
use num_traits;

//ndarray has no built-in homogeneous padding so we add it as small traits, the
// same way gather/scatter are usually bolted on
pub trait PadOnes1<T: nd::ScalarOperand + num_traits::Zero + num_traits::One + Copy> {
    fn pad_ones(&self) -> nd::Array1<T>; //append a single trailing 1, turning a flat coordinate
                                         // vector into its homogeneous form
}
impl<T, S> PadOnes1<T> for nd::ArrayBase<S, nd::Ix1>
where
    T: nd::ScalarOperand + num_traits::Zero + num_traits::One + Copy,
    S: nd::Data<Elem = T>,
{
    fn pad_ones(&self) -> nd::Array1<T> {
        let mut res = nd::Array1::<T>::zeros(self.len() + 1);
        res.slice_mut(s![0..self.len()]).assign(self);
        res[self.len()] = T::one();
        res
    }
}

pub trait PadOnes2<T: nd::ScalarOperand + num_traits::Zero + num_traits::One + Copy> {
    fn pad_ones(&self) -> nd::Array2<T>; //append a trailing column of ones, one homogeneous
                                         // coordinate per row
}
impl<T, S> PadOnes2<T> for nd::ArrayBase<S, nd::Ix2>
where
    T: nd::ScalarOperand + num_traits::Zero + num_traits::One + Copy,
    S: nd::Data<Elem = T>,
{
    fn pad_ones(&self) -> nd::Array2<T> {
        let mut res = nd::Array2::<T>::zeros((self.nrows(), self.ncols() + 1));
        res.slice_mut(s![.., 0..self.ncols()]).assign(self);
        res.column_mut(self.ncols()).fill(T::one());
        res
    }
}
